pub mod return_request;
pub mod return_status_change;
