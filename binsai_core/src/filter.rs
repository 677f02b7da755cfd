//! Rolling mean over the last N accepted samples.

/// Fixed ring of the last `N` valid samples. Invalid samples never enter.
#[derive(Debug, Clone)]
pub struct RollingMean<const N: usize> {
    buf: [f32; N],
    len: usize,
    head: usize,
}

impl<const N: usize> Default for RollingMean<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RollingMean<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0.0; N],
            len: 0,
            head: 0,
        }
    }

    /// Push a sample; `None` and non-finite values are ignored.
    /// Returns the mean after the push, if any samples are held.
    pub fn push(&mut self, sample: Option<f32>) -> Option<f32> {
        if let Some(v) = sample
            && v.is_finite()
            && N > 0
        {
            self.buf[self.head] = v;
            self.head = (self.head + 1) % N;
            self.len = (self.len + 1).min(N);
        }
        self.mean()
    }

    pub fn mean(&self) -> Option<f32> {
        if self.len == 0 {
            return None;
        }
        let sum: f64 = self.samples().map(f64::from).sum();
        #[allow(clippy::cast_possible_truncation)]
        Some((sum / self.len as f64) as f32)
    }

    /// Held samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        let start = (self.head + N - self.len) % N.max(1);
        (0..self.len).map(move |i| self.buf[(start + i) % N])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.head = 0;
    }
}
