pub mod executor;
pub mod submit;

pub use executor::{
    normalize_date, parse_bool, validate_date_format, FieldOutcome, FillExecutor, FillReport, FillStatus,
};
pub use submit::{submit_form, SubmitMethod};
