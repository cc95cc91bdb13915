/// One luminance reading taken from a captured frame.
///
/// `timestamp` is in microseconds on the monotonic clock that drives the
/// monitor; `value` is in luminance units, [0, 255].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LuminanceSample {
    pub timestamp: i64,
    pub value: f64,
}

impl LuminanceSample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl std::fmt::Display for LuminanceSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{:.2}", self.timestamp, self.value)
    }
}
