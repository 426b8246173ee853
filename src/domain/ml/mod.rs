// Reversible price normalization
pub mod scaler;

// Sliding-window dataset construction
pub mod window;

pub use scaler::MinMaxScaler;
pub use window::WindowDataset;
