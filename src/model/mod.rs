pub mod classification;
pub mod display;
pub mod upload;
pub mod validation;

pub use classification::{classify, FileClassification};
pub use display::DisplayStrategy;
pub use upload::{FileId, UploadedFile};
pub use validation::validate;
