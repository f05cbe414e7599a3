pub mod formatting;

pub use formatting::{format_megabytes, format_tag, value_to_string};
