pub mod return_record;
