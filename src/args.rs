use clap::Parser;

/// Normalizes repeated allocation columns of a table and maintains a cross-tab view over the result.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON configuration of the run. The other options override
    /// the values it contains.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) A reference file containing the expected normalized table in CSV format. If provided,
    /// allocpivot will check that the table it writes matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (directory path) Where the normalized table and the view are written. Defaults to the
    /// directory of the input.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file or directory path) The input: a directory of CSV files or an Excel workbook.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (csv or xlsx) The type of the input. Guessed from the input path if not provided.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (repeated) A requested column. A trailing '*' requests all the columns starting with the label.
    /// The order of the --columns flags is the order of the output columns.
    #[clap(long, value_parser)]
    pub columns: Option<Vec<String>>,

    /// The name of the table (CSV file name without extension, or worksheet) holding the source data.
    #[clap(long, value_parser)]
    pub source_table: Option<String>,

    /// The name of the cross-tab view. The normalized table is written as '<view>-raw'.
    #[clap(long, value_parser)]
    pub view: Option<String>,

    /// (optional) The name of the table mapping projects to themes.
    #[clap(long, value_parser)]
    pub theme_table: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
