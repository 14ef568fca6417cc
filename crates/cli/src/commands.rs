use clap::Subcommand;
use connectors::adapter::Driver;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Page through the configured query and report metrics
    Run {
        #[arg(long, help = "Settings file path (JSON)")]
        config: PathBuf,

        #[arg(long, help = "Override pagination.page_size")]
        page_size: Option<usize>,

        #[arg(long, help = "Override pagination.max_pages")]
        max_pages: Option<usize>,

        #[arg(long, help = "Print the metrics summary as JSON")]
        json: bool,
    },
    /// Print the session query and its cache fingerprint
    Render {
        #[arg(long, help = "Settings file path (JSON)")]
        config: PathBuf,
    },
    /// Test a connection URL with `SELECT 1`
    TestConn {
        /// Driver: "pg", "postgres", "mysql", "mariadb"
        #[arg(long)]
        driver: Driver,

        #[arg(long)]
        url: String,
    },
}
