pub(crate) mod health_check_controller;
pub(crate) mod sse_controller;
pub(crate) mod stream_controller;
