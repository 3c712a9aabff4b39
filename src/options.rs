/// Configuration for a [`Decoder`](crate::Decoder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Maximum number of samples, summed over the padded planes of all components, that a frame
    /// may have. `None` disables the check.
    ///
    /// Defaults to 2<sup>28</sup>.
    pub pixel_limit: Option<usize>,
    /// Whether data after the EOI marker is an error. If `false` (the default), it is logged and
    /// ignored.
    pub strict_trailing_data: bool,
}

impl DecoderOptions {
    pub const DEFAULT_PIXEL_LIMIT: usize = 1 << 28;

    pub fn pixel_limit(mut self, limit: Option<usize>) -> Self {
        self.pixel_limit = limit;
        self
    }

    pub fn strict_trailing_data(mut self, strict: bool) -> Self {
        self.strict_trailing_data = strict;
        self
    }
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            pixel_limit: Some(Self::DEFAULT_PIXEL_LIMIT),
            strict_trailing_data: false,
        }
    }
}
