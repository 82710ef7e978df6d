//! Command line arguments.

use std::path::PathBuf;

use clap::builder::NonEmptyStringValueParser;
use clap::{Args, Parser, Subcommand};
use ingestion::IngestConfig;

use crate::config::LogFormat;

#[derive(Parser, Debug)]
#[command(name = "h3-importer")]
#[command(about = "Convert rasters and vectors to H3 grid tables and register them in the catalog")]
pub struct Cli {
    /// Configuration file path (YAML)
    #[arg(short, long, global = true, env = "H3_IMPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level, overrides the config file and RUST_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert a folder of aligned rasters into one grid table
    Raster(RasterArgs),
    /// Convert the single GeoJSON file of a folder into a grid table
    Vector(VectorArgs),
    /// Re-run catalog registration for an already loaded table
    Register(RegisterArgs),
    /// Link a COG or an external tiler as a contextual layer
    LinkLayer(LinkLayerArgs),
    /// List grid tables with no catalog entry, optionally dropping them
    Gc(GcArgs),
    /// Download a source file with retry
    Fetch(FetchArgs),
    /// Create the catalog schema if missing
    Bootstrap,
}

/// Conversion settings overriding the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct IngestOverrides {
    /// H3 resolution of the grid
    #[arg(long = "h3-res")]
    pub h3_res: Option<u8>,

    /// Conversion worker threads
    #[arg(long)]
    pub workers: Option<usize>,

    /// Block window edge in pixels
    #[arg(long)]
    pub block_size: Option<usize>,
}

impl IngestOverrides {
    pub fn apply(&self, mut config: IngestConfig) -> IngestConfig {
        if let Some(res) = self.h3_res {
            config.h3_resolution = res;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        config
    }
}

/// Contextual layer attached to a grid table.
#[derive(Args, Debug, Clone, Default)]
pub struct LayerArgs {
    /// Contextual layer name
    #[arg(long, requires = "category")]
    pub layer_name: Option<String>,

    /// Contextual layer category
    #[arg(long, requires = "layer_name")]
    pub category: Option<String>,

    /// JSON file with the layer metadata
    #[arg(long, requires = "layer_name")]
    pub metadata: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RasterArgs {
    /// Folder holding the .tif/.tiff files
    pub folder: PathBuf,
    /// Target grid table
    pub table: String,
    /// production, harvest_area, indicator, material_indicator or contextual
    pub kind: String,
    /// Material dataset, or the indicator name code for indicator kinds
    pub dataset: String,
    pub year: i32,

    #[command(flatten)]
    pub ingest: IngestOverrides,

    #[command(flatten)]
    pub layer: LayerArgs,
}

#[derive(Args, Debug)]
pub struct VectorArgs {
    /// Folder holding exactly one GeoJSON file
    pub folder: PathBuf,
    /// Target grid table
    pub table: String,
    /// Feature property to convert
    pub column: String,
    /// Dataset name, also the contextual layer name
    pub dataset: String,
    /// Contextual layer category
    pub category: String,
    pub year: i32,

    /// Indicator name code to link
    #[arg(long)]
    pub indicator: Option<String>,

    /// JSON file with the layer metadata
    #[arg(long)]
    pub metadata: Option<PathBuf>,

    #[command(flatten)]
    pub ingest: IngestOverrides,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    pub table: String,
    pub kind: String,
    pub dataset: String,
    pub year: i32,

    /// Columns to register (default: every data column of the table)
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Resolution recorded in the catalog
    #[arg(long = "h3-res")]
    pub h3_res: Option<u8>,

    #[command(flatten)]
    pub layer: LayerArgs,
}

#[derive(Args, Debug)]
pub struct LinkLayerArgs {
    /// COG name served by the built-in tiler, or an s3:// / https:// tiler URL
    #[arg(long)]
    pub cog: String,

    /// Contextual layer name
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub category: String,

    /// Default tiler parameter as key=value (repeatable)
    #[arg(long = "tiler-param", visible_alias = "tp")]
    pub tiler_params: Vec<String>,

    /// JSON file with the layer metadata
    #[arg(long)]
    pub metadata: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct GcArgs {
    /// Only consider tables starting with this prefix
    #[arg(long, default_value = "h3_grid_", value_parser = NonEmptyStringValueParser::new())]
    pub prefix: String,

    /// Drop the orphan tables instead of listing them
    #[arg(long)]
    pub drop: bool,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    pub url: String,
    /// Directory receiving the file
    pub dest: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_raster() {
        let cli = Cli::parse_from([
            "h3-importer",
            "--log-format",
            "pretty",
            "raster",
            "/data/spam",
            "h3_grid_spam_production",
            "production",
            "spam",
            "2010",
            "--h3-res",
            "5",
            "--layer-name",
            "spam",
            "--category",
            "Food and agriculture",
        ]);
        assert_eq!(cli.log_format, Some(LogFormat::Pretty));
        let Command::Raster(args) = cli.command else {
            panic!("expected raster command");
        };
        assert_eq!(args.year, 2010);
        assert_eq!(args.ingest.h3_res, Some(5));
        let config = args.ingest.apply(IngestConfig::default());
        assert_eq!(config.h3_resolution, 5);
        assert_eq!(config.workers, 4);
        assert_eq!(args.layer.category.as_deref(), Some("Food and agriculture"));
    }

    #[test]
    fn test_layer_category_requires_name() {
        let parsed = Cli::try_parse_from([
            "h3-importer", "raster", "/data", "t", "contextual", "x", "2020", "--category",
            "Default",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_link_layer_params() {
        let cli = Cli::parse_from([
            "h3-importer", "link-layer", "--cog", "forest.tif", "--name", "forest",
            "--category", "Default", "--tp", "colormap=viridis", "--tiler-param", "rescale=0,1",
        ]);
        let Command::LinkLayer(args) = cli.command else {
            panic!("expected link-layer command");
        };
        assert_eq!(args.tiler_params, vec!["colormap=viridis", "rescale=0,1"]);
    }

    #[test]
    fn test_register_columns() {
        let cli = Cli::parse_from([
            "h3-importer", "register", "h3_grid_demo", "contextual", "-", "2020", "--columns",
            "cropA,cropB",
        ]);
        let Command::Register(args) = cli.command else {
            panic!("expected register command");
        };
        assert_eq!(args.columns, vec!["cropA", "cropB"]);
    }

    #[test]
    fn test_gc_prefix_must_not_be_empty() {
        assert!(Cli::try_parse_from(["h3-importer", "gc", "--prefix", "", "--drop"]).is_err());

        let cli = Cli::parse_from(["h3-importer", "gc"]);
        let Command::Gc(args) = cli.command else {
            panic!("expected gc command");
        };
        assert_eq!(args.prefix, "h3_grid_");
        assert!(!args.drop);
    }
}
