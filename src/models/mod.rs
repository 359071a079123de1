/// Stacked convolutional feature extractor.
pub mod sequence_block;

/// Decode-window projection head.
pub mod forecast_head;

/// Full forecasting network composed of the two stages above.
pub mod cnn_network;
