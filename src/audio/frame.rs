/// One stereo sample pair, signed 16-bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    pub const SILENCE: Frame = Frame { left: 0, right: 0 };

    pub const fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }

    /// Additive mix with 16-bit wraparound. No clipping, no normalisation.
    #[inline]
    pub fn mix(self, other: Frame) -> Frame {
        Frame {
            left: self.left.wrapping_add(other.left),
            right: self.right.wrapping_add(other.right),
        }
    }

    #[inline]
    pub fn is_silent(self) -> bool {
        self == Frame::SILENCE
    }
}
