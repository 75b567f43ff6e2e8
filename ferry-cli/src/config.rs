/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the scheduler service
    pub scheduler_url: String,
}
