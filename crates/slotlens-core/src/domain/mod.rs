pub mod conditions;
pub mod dates;
pub mod evaluation;
pub mod slots;
pub mod validation;
