use anyhow::{Context, bail};
use plenodec_rs::lf_pipeline::{DecodeConfig, ExternalToolDecoder};
use plenodec_rs::logger;

use tracing::{error, info};

const USAGE: &str = "\
Usage: plenodec <input.lf> <output-dir> [options]

Options:
  --stats <file>         write the decode statistics JSON here
  --hm-decoder <path>    HEVC reference decoder binary (default: TAppDecoder in PATH)
  --kdu-expand <path>    Kakadu JPEG2000 expander binary (default: kdu_expand in PATH)
  --gzip <path>          gzip binary for deflated view metadata
  --median-depth         3x3 median-filter predicted inverse-depth maps
  --save-warped          persist every per-reference warped view
  --verbose              debug logging with per-view stage durations
";

fn parse_args() -> anyhow::Result<DecodeConfig> {
    let mut args = std::env::args().skip(1);
    let input = args.next().context(USAGE)?;
    let output_directory = args.next().context(USAGE)?;

    let mut builder = DecodeConfig::builder()
        .input(input)
        .output_directory(output_directory);

    while let Some(flag) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .with_context(|| format!("{name} needs a value\n\n{USAGE}"))
        };
        builder = match flag.as_str() {
            "--stats" => builder.stats_file(value("--stats")?),
            "--hm-decoder" => builder.hevc_decoder(value("--hm-decoder")?),
            "--kdu-expand" => builder.kakadu_expand(value("--kdu-expand")?),
            "--gzip" => builder.gzip(value("--gzip")?),
            "--median-depth" => builder.median_filter_depth(true),
            "--save-warped" => builder.save_partial_warped(true),
            "--verbose" => builder, // consumed before parsing, for the logger
            other => bail!("unknown option {other}\n\n{USAGE}"),
        };
    }

    Ok(builder.build())
}

fn main() -> anyhow::Result<()> {
    let verbose = std::env::args().any(|a| a == "--verbose");
    logger::init(if verbose { "debug" } else { "info" });

    let config = parse_args()?;
    info!("decoding {}", config.input.display());
    info!("outputs to {}", config.output_directory.display());

    let decoder = ExternalToolDecoder::new(config)?;
    match decoder.decode() {
        Ok(stats) => {
            info!("decoded {} views", stats.views.len());
            Ok(())
        }
        Err(e) => {
            error!("decode failed: {e}");
            Err(e.into())
        }
    }
}
