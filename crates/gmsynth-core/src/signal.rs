//! Planar multi-channel signal buffers.
//!
//! Storage is planar (one contiguous run per channel) rather than
//! interleaved, so the render loop can write a channel at a time without
//! striding, and so a [`SignalView`] can hand out one mutable slice per
//! channel without aliasing.

use crate::sample::Sample;

/// An owned planar multi-channel buffer.
pub struct Signal<S: Sample> {
    channels: Vec<Vec<S>>,
    num_samples: usize,
}

impl<S: Sample> Signal<S> {
    /// Allocate a zero-filled buffer with `num_channels` channels of
    /// `num_samples` samples each. Intended for setup time, not per-block
    /// use: allocation happens here, nowhere else in this type.
    pub fn new(num_channels: usize, num_samples: usize) -> Self {
        let channels = (0..num_channels).map(|_| vec![S::ZERO; num_samples]).collect();
        Self {
            channels,
            num_samples,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Set every sample in every channel back to zero. O(n), no
    /// (de)allocation.
    pub fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.fill(S::ZERO);
        }
    }

    pub fn channel(&self, index: usize) -> &[S] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [S] {
        &mut self.channels[index]
    }

    /// Borrow every channel as a mutable view, for callers (like
    /// `Synthesizer::render_next_block`) that want to write into several
    /// channels inside one sample loop without repeated indexing.
    pub fn view_mut(&mut self) -> SignalView<'_, S> {
        SignalView {
            channels: self.channels.iter_mut().map(|c| c.as_mut_slice()).collect(),
        }
    }
}

/// A borrowed view over a [`Signal`]'s channels: one read/write slice per
/// channel. Borrowing, not owning, so building a view never allocates.
pub struct SignalView<'a, S: Sample> {
    channels: Vec<&'a mut [S]>,
}

impl<'a, S: Sample> SignalView<'a, S> {
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[S] {
        self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [S] {
        self.channels[index]
    }

    /// Write a single stereo frame (`left`, `right`) at sample index `i`.
    /// Panics if the view has fewer than two channels; the engine only
    /// ever constructs stereo views, so this is a programmer-error guard,
    /// not a recoverable condition.
    #[inline]
    pub fn write_stereo_frame(&mut self, i: usize, left: S, right: S) {
        self.channels[0][i] = left;
        self.channels[1][i] = right;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_signal_is_zero_filled() {
        let sig = Signal::<f32>::new(2, 16);
        assert_eq!(sig.num_channels(), 2);
        assert_eq!(sig.num_samples(), 16);
        assert!(sig.channel(0).iter().all(|&x| x == 0.0));
        assert!(sig.channel(1).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn clear_resets_after_writes() {
        let mut sig = Signal::<f32>::new(1, 4);
        sig.channel_mut(0).copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        sig.clear();
        assert!(sig.channel(0).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn view_writes_stereo_frames_into_backing_channels() {
        let mut sig = Signal::<f32>::new(2, 4);
        {
            let mut view = sig.view_mut();
            view.write_stereo_frame(0, 0.5, -0.5);
            view.write_stereo_frame(1, 1.0, -1.0);
        }
        assert_eq!(sig.channel(0)[0], 0.5);
        assert_eq!(sig.channel(1)[0], -0.5);
        assert_eq!(sig.channel(0)[1], 1.0);
        assert_eq!(sig.channel(1)[1], -1.0);
    }
}
