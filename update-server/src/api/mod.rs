pub mod report_status;
pub mod update_check;
pub mod utils;
