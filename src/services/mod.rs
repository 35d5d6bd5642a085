// Return request intake, lookup and review
pub mod returns;

pub use returns::{ReturnPolicy, ReturnService};
