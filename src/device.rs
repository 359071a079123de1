use std::fmt;

use tracing::debug;

/// Compute device a forecaster runs on.
///
/// Chosen once when a [`crate::Forecaster`] is built and fixed for its
/// lifetime. Only the host CPU backend exists; numeric kernels may still use
/// several cores internally through the BLAS-style matrix products.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
}

impl Device {
    /// Pick the best available device.
    pub fn auto() -> Self {
        let device = Device::Cpu;
        debug!(device = %device, "device used");
        device
    }

    pub fn name(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_detects_cpu() {
        assert_eq!(Device::auto(), Device::Cpu);
        assert_eq!(Device::default().to_string(), "cpu");
    }
}
