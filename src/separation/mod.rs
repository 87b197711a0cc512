// Source separation - isolates the bass line of the chorus

pub mod backend;
pub mod postprocess;
pub mod spectral;

pub use backend::{create_separator, SeparationConfig, SeparationError, SeparatorBackend, SourceSeparator};
pub use postprocess::process_bass_line;
pub use spectral::SpectralBassSeparator;
