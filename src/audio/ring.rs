//! Fixed-capacity circular buffer of mixed frames.
//!
//! The buffer sits between the per-frame mixing step and the device pull:
//! [`MixBuffer::ensure_filled`] mixes ahead of the read cursor,
//! [`MixBuffer::drain`] hands frames out. Cursors are monotonic counters and
//! only their difference is ever compared with the capacity.

use super::{AudioError, AudioResult, Frame};

pub struct MixBuffer {
    frames: Box<[Frame]>,
    read_pos: u64,
    write_pos: u64,
}

impl MixBuffer {
    /// Allocate a buffer of `capacity` frames. Fails with `OutOfMemory`
    /// instead of aborting when the allocation cannot be satisfied.
    pub fn with_capacity(capacity: usize) -> AudioResult<Self> {
        let mut frames = Vec::new();
        frames
            .try_reserve_exact(capacity)
            .map_err(|_| AudioError::OutOfMemory)?;
        frames.resize(capacity, Frame::SILENCE);
        Ok(Self {
            frames: frames.into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Frames mixed but not yet drained.
    pub fn frames_buffered(&self) -> usize {
        (self.write_pos - self.read_pos) as usize
    }

    pub fn read_pos(&self) -> u64 {
        self.read_pos
    }

    pub fn write_pos(&self) -> u64 {
        self.write_pos
    }

    /// Mix frames with `next` until at least `n` are buffered.
    /// Returns how many frames were newly mixed.
    pub fn ensure_filled(
        &mut self,
        n: usize,
        mut next: impl FnMut() -> Frame,
    ) -> AudioResult<usize> {
        let capacity = self.capacity();
        if n > capacity {
            return Err(AudioError::BufferOverrun {
                requested: n,
                capacity,
            });
        }
        let mut mixed = 0;
        while self.frames_buffered() < n {
            let idx = (self.write_pos % capacity as u64) as usize;
            self.frames[idx] = next();
            self.write_pos += 1;
            mixed += 1;
        }
        Ok(mixed)
    }

    /// Copy `left.len()` frames into the split output channels, mixing more
    /// with `next` first if the buffer holds too few.
    pub fn drain(
        &mut self,
        left: &mut [i16],
        right: &mut [i16],
        next: impl FnMut() -> Frame,
    ) -> AudioResult<()> {
        let n = left.len().min(right.len());
        self.ensure_filled(n, next)?;
        let capacity = self.capacity() as u64;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let frame = self.frames[(self.read_pos % capacity) as usize];
            *l = frame.left;
            *r = frame.right;
            self.read_pos += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> impl FnMut() -> Frame {
        let mut i = 0i16;
        move || {
            i += 1;
            Frame::new(i, -i)
        }
    }

    #[test]
    fn drain_returns_frames_in_mix_order() {
        let mut buf = MixBuffer::with_capacity(8).unwrap();
        let mut next = counter();
        let mut l = [0i16; 5];
        let mut r = [0i16; 5];
        buf.drain(&mut l, &mut r, &mut next).unwrap();
        assert_eq!(l, [1, 2, 3, 4, 5]);
        assert_eq!(r, [-1, -2, -3, -4, -5]);
        buf.drain(&mut l, &mut r, &mut next).unwrap();
        assert_eq!(l, [6, 7, 8, 9, 10], "second drain wraps around the array");
    }

    #[test]
    fn buffered_accounting_holds_across_drains() {
        let mut buf = MixBuffer::with_capacity(16).unwrap();
        let mut next = counter();
        buf.ensure_filled(10, &mut next).unwrap();
        for n in [3usize, 7, 16, 1, 12] {
            let before = buf.frames_buffered();
            let newly = n.saturating_sub(before);
            let mut l = vec![0i16; n];
            let mut r = vec![0i16; n];
            buf.drain(&mut l, &mut r, &mut next).unwrap();
            assert_eq!(buf.frames_buffered(), before + newly - n);
            assert!(buf.write_pos() - buf.read_pos() <= buf.capacity() as u64);
        }
    }

    #[test]
    fn ensure_filled_does_not_mix_when_enough_buffered() {
        let mut buf = MixBuffer::with_capacity(4).unwrap();
        assert_eq!(buf.ensure_filled(3, counter()).unwrap(), 3);
        assert_eq!(buf.ensure_filled(2, || panic!("must not mix")).unwrap(), 0);
    }

    #[test]
    fn oversized_pull_is_rejected() {
        let mut buf = MixBuffer::with_capacity(4).unwrap();
        let mut l = [0i16; 5];
        let mut r = [0i16; 5];
        let err = buf.drain(&mut l, &mut r, counter()).unwrap_err();
        assert!(matches!(
            err,
            AudioError::BufferOverrun {
                requested: 5,
                capacity: 4
            }
        ));
        assert_eq!(buf.frames_buffered(), 0, "nothing mixed on overrun");
    }
}
