//! Fixed-size, channel-interleaved-free audio block — the universal DSP unit (C1).

/// Number of frames in one processing chunk. Compile-time constant shared by
/// every component of the engine; never a runtime parameter.
pub const AUDIO_CHUNK_SIZE: usize = 64;

/// Storage for a single channel: either owned by this buffer or borrowed from
/// a caller's memory (§4.1: owning vs. non-owning buffers).
enum Channel<'a> {
    Owned(Box<[f32; AUDIO_CHUNK_SIZE]>),
    Borrowed(&'a mut [f32; AUDIO_CHUNK_SIZE]),
}

impl<'a> Channel<'a> {
    #[inline]
    fn as_mut(&mut self) -> &mut [f32; AUDIO_CHUNK_SIZE] {
        match self {
            Channel::Owned(b) => b,
            Channel::Borrowed(r) => r,
        }
    }

    #[inline]
    fn as_ref(&self) -> &[f32; AUDIO_CHUNK_SIZE] {
        match self {
            Channel::Owned(b) => b,
            Channel::Borrowed(r) => r,
        }
    }
}

/// A block of `channels` × [`AUDIO_CHUNK_SIZE`] 32-bit float frames.
///
/// Channels are stored as separate contiguous arrays, so a [`SampleBuffer`]
/// can be constructed as a *view* over a contiguous subrange of another
/// buffer's channels without copying (§4.1). Channel count is fixed at
/// construction (§3 invariant); frame count is fixed globally via
/// [`AUDIO_CHUNK_SIZE`]. A non-owning view cannot outlive the buffer it
/// borrows from — the `'a` lifetime ties the two together and the borrow
/// checker enforces it, standing in for the spec's "enforced by the type
/// system in a systems-language rewrite".
pub struct SampleBuffer<'a> {
    channels: Vec<Channel<'a>>,
}

impl SampleBuffer<'static> {
    /// Construct an owning buffer with `channels` channels of silence.
    pub fn owning(channels: usize) -> Self {
        let channels = (0..channels)
            .map(|_| Channel::Owned(Box::new([0.0f32; AUDIO_CHUNK_SIZE])))
            .collect();
        Self { channels }
    }
}

impl<'a> SampleBuffer<'a> {
    /// Construct a non-owning view over a contiguous subrange of `base`'s
    /// channels.
    pub fn view(base: &'a mut SampleBuffer<'_>, start_channel: usize, channel_count: usize) -> Self {
        assert!(
            start_channel + channel_count <= base.channels.len(),
            "view range out of bounds"
        );
        let channels = base.channels[start_channel..start_channel + channel_count]
            .iter_mut()
            .map(|c| Channel::Borrowed(c.as_mut()))
            .collect();
        Self { channels }
    }

    /// Number of channels in this buffer.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames; always [`AUDIO_CHUNK_SIZE`].
    #[inline]
    pub fn frame_count(&self) -> usize {
        AUDIO_CHUNK_SIZE
    }

    /// Zero every channel.
    pub fn clear(&mut self) {
        for c in &mut self.channels {
            c.as_mut().fill(0.0);
        }
    }

    /// Mutable span of [`AUDIO_CHUNK_SIZE`] floats for channel `i`.
    #[inline]
    pub fn channel(&mut self, i: usize) -> &mut [f32; AUDIO_CHUNK_SIZE] {
        self.channels[i].as_mut()
    }

    /// Read-only span of [`AUDIO_CHUNK_SIZE`] floats for channel `i`.
    #[inline]
    pub fn channel_ref(&self, i: usize) -> &[f32; AUDIO_CHUNK_SIZE] {
        self.channels[i].as_ref()
    }

    /// Copy the contents of `other` into `self`, channel by channel. Channel
    /// counts are pre-negotiated at graph-build time (§4.3 step 3); a
    /// mismatch here is a configuration error, so this copies the overlap.
    pub fn copy_from(&mut self, other: &SampleBuffer<'_>) {
        let n = self.channel_count().min(other.channel_count());
        for i in 0..n {
            self.channel(i).copy_from_slice(other.channel_ref(i));
        }
    }

    /// Sum `other` into `self`, channel by channel (used when multiple Track
    /// outputs target the same engine output channel — §4.5 step 7).
    pub fn accumulate_from(&mut self, other: &SampleBuffer<'_>) {
        let n = self.channel_count().min(other.channel_count());
        for i in 0..n {
            let src = *other.channel_ref(i);
            let dst = self.channel(i);
            for f in 0..AUDIO_CHUNK_SIZE {
                dst[f] += src[f];
            }
        }
    }

    /// Deinterleave `src` (length `channel_count * AUDIO_CHUNK_SIZE`) into
    /// this buffer's channels.
    pub fn from_interleaved(&mut self, src: &[f32]) {
        let channels = self.channel_count();
        for frame in 0..AUDIO_CHUNK_SIZE {
            for ch in 0..channels {
                let idx = frame * channels + ch;
                if idx < src.len() {
                    self.channel(ch)[frame] = src[idx];
                }
            }
        }
    }

    /// Interleave this buffer's channels into `dst` (length
    /// `channel_count * AUDIO_CHUNK_SIZE`).
    pub fn to_interleaved(&self, dst: &mut [f32]) {
        let channels = self.channel_count();
        for frame in 0..AUDIO_CHUNK_SIZE {
            for ch in 0..channels {
                let idx = frame * channels + ch;
                if idx < dst.len() {
                    dst[idx] = self.channel_ref(ch)[frame];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owning_buffer_is_silent() {
        let buf = SampleBuffer::owning(2);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.frame_count(), AUDIO_CHUNK_SIZE);
        assert!(buf.channel_ref(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn view_shares_storage() {
        let mut base = SampleBuffer::owning(4);
        base.channel(2)[0] = 0.5;
        let mut view = SampleBuffer::view(&mut base, 2, 2);
        assert_eq!(view.channel_count(), 2);
        assert_eq!(view.channel(0)[0], 0.5);
        view.channel(0)[1] = 0.25;
        assert_eq!(base.channel(2)[1], 0.25);
    }

    #[test]
    fn interleave_roundtrip() {
        let mut buf = SampleBuffer::owning(2);
        buf.channel(0)[0] = 0.5;
        buf.channel(1)[0] = -0.25;
        let mut interleaved = vec![0.0f32; 2 * AUDIO_CHUNK_SIZE];
        buf.to_interleaved(&mut interleaved);
        assert_eq!(interleaved[0], 0.5);
        assert_eq!(interleaved[1], -0.25);

        let mut roundtrip = SampleBuffer::owning(2);
        roundtrip.from_interleaved(&interleaved);
        assert_eq!(roundtrip.channel_ref(0)[0], 0.5);
        assert_eq!(roundtrip.channel_ref(1)[0], -0.25);
    }

    #[test]
    fn accumulate_sums_channels() {
        let mut a = SampleBuffer::owning(1);
        let mut b = SampleBuffer::owning(1);
        a.channel(0)[0] = 0.3;
        b.channel(0)[0] = 0.4;
        a.accumulate_from(&b);
        assert!((a.channel_ref(0)[0] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn clear_zeroes_all_channels() {
        let mut buf = SampleBuffer::owning(2);
        buf.channel(0).fill(1.0);
        buf.channel(1).fill(-1.0);
        buf.clear();
        assert!(buf.channel_ref(0).iter().all(|&s| s == 0.0));
        assert!(buf.channel_ref(1).iter().all(|&s| s == 0.0));
    }
}
