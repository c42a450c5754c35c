use clap::{Parser, Subcommand};

use crate::api::DatasetKind;

/// Console for the electoral analytics backend.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON settings file. Recognized keys: apiUrl, refreshIntervalSecs,
    /// counterDurationMs, progressTickMs, timeoutSecs.
    #[clap(short, long, value_parser, global = true)]
    pub config: Option<String>,

    /// (url) The base URL of the backend API. Overrides the settings file and the
    /// ELECTORAL_API_URL environment variable.
    #[clap(long, value_parser, global = true)]
    pub api_url: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging.
    #[clap(long, takes_value = false, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Lists the original datasets.
    Datasets {
        /// (dataset id) Deletes this dataset before listing.
        #[clap(long, value_parser)]
        delete: Option<String>,
    },
    /// Lists the cleaned datasets.
    Cleaned {
        /// (cleaned dataset id) Deletes this cleaned dataset before listing.
        #[clap(long, value_parser)]
        delete: Option<String>,
    },
    /// Downloads a dataset file.
    Download {
        #[clap(value_enum)]
        kind: DatasetKind,
        #[clap(value_parser)]
        id: String,
        /// (file path) Where to write the file. Defaults to <kind>_<id>.csv
        #[clap(short, long, value_parser)]
        out: Option<String>,
    },
    /// Shows the available cleaning operations.
    Operations,
    /// Runs the whole workflow on a CSV file: upload, cleaning, training and results.
    Analyze {
        /// (file path) The CSV dataset to upload.
        #[clap(short, long, value_parser)]
        file: String,
        /// (operation name, repeatable) A cleaning operation to apply. See the operations command.
        #[clap(long = "op", value_parser)]
        operations: Vec<String>,
    },
    /// Shows the live results board.
    Results {
        /// Keeps refreshing the board until interrupted.
        #[clap(long, takes_value = false)]
        watch: bool,
        /// (region name, default Nacional) The region to focus on.
        #[clap(long, value_parser)]
        region: Option<String>,
        /// (count) With --watch, stops after this many refreshes.
        #[clap(long, value_parser)]
        cycles: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_collects_repeated_operations() {
        let args = Args::parse_from([
            "eldash",
            "analyze",
            "--file",
            "padron.csv",
            "--op",
            "Eliminar duplicados",
            "--op",
            "Eliminar filas vacías",
            "--verbose",
        ]);
        assert!(args.verbose);
        match args.command {
            Command::Analyze { file, operations } => {
                assert_eq!(file, "padron.csv");
                assert_eq!(operations, vec!["Eliminar duplicados", "Eliminar filas vacías"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn download_takes_a_kind() {
        let args = Args::parse_from(["eldash", "--api-url", "http://h/api", "download", "cleaned", "7"]);
        assert_eq!(args.api_url.as_deref(), Some("http://h/api"));
        match args.command {
            Command::Download { kind, id, out } => {
                assert_eq!(kind, DatasetKind::Cleaned);
                assert_eq!(id, "7");
                assert_eq!(out, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
