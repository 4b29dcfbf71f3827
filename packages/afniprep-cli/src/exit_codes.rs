pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INPUT_ERROR: i32 = 2;
pub const TOOL_NOT_FOUND: i32 = 3;
/// Some items finished, others failed
pub const PARTIAL_FAILURE: i32 = 4;
