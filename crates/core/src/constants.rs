/// Constants used throughout the swipe codebase
// Object tagging
pub const INTERMEDIATE_TAG_KEY: &str = "intermediate_output";
pub const INTERMEDIATE_TAG_VALUE: &str = "true";

// Remote storage
pub const REMOTE_URI_SCHEME: &str = "s3://";
pub const CACHE_URI_SEGMENT: &str = "cache";

// Run directory layout
pub const OUTPUT_LINKS_DIR: &str = "out";
pub const OUTPUTS_MANIFEST_FILENAME: &str = "outputs.s3.json";
pub const STDOUT_CAPTURE_FILENAME: &str = "stdout.txt";

// Run ids
pub const DOWNLOAD_STEP_PREFIX: &str = "download-";

// Status manifest
pub const STATUS_MANIFEST_SUFFIX: &str = "_status2.json";

// Remote execution
pub const DEFAULT_LOG_GROUP: &str = "/aws/batch/job";
pub const DEFAULT_JOB_MEMORY_MIB: i64 = 130_816;
pub const DEFAULT_JOB_CPU: i64 = 4;
pub const DEFAULT_JOB_RETRIES: i64 = 3;

// Environment variables handed to remote jobs
pub const ENV_INPUT_URI: &str = "WDL_INPUT_URI";
pub const ENV_OUTPUT_URI: &str = "WDL_OUTPUT_URI";
pub const ENV_TASK: &str = "TASK";
