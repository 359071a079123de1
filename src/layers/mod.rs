/// Elementwise activation gates.
pub mod activation;

/// Length-preserving 1-D convolution.
pub mod conv1d;

/// Fully connected projection.
pub mod linear;
