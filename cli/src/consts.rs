/// Where `vote-cli` looks for the vote service when `--service-url` is unset.
pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:3000";
