mod report_json;

pub use self::report_json::*;
