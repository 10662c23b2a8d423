use bolidebox::{
    parse_timestamp, write_matrix, BoundingBoxRequest, EventClient, ExtractedRaster, Extractor,
    Product, ReferenceGridCache, Resolution, S3Client, Satellite, StorageConfig,
    DEFAULT_ENDPOINT_TEMPLATE, DEFAULT_EVENT_ENDPOINT,
};
use chrono::NaiveDateTime;
use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::{
    error::Error,
    fmt::{self, Display},
    path::{Path, PathBuf},
};

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Cut a box around a point out of archived full disk imagery.
///
/// The pixels are written as a plain text matrix, one row per line. For an event, one file is
/// written for each satellite that detected it.
///
#[derive(Debug, Parser)]
#[clap(name = "bbox_extract")]
#[clap(author, version, about)]
struct ExtractOptionsInit {
    /// The id of an event in the bolide database.
    #[clap(short, long)]
    #[clap(required_unless_present_all = &["sat", "lat", "lon", "time"])]
    #[clap(conflicts_with_all = &["sat", "lat", "lon", "time", "output"])]
    event: Option<String>,

    /// The satellite, 16 or 17.
    #[clap(long)]
    sat: Option<String>,

    /// Latitude of the center of the box in degrees.
    #[clap(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude of the center of the box in degrees.
    #[clap(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Time (UTC) in the format YYYY-MM-DDTHH:MM:SS
    #[clap(long)]
    time: Option<String>,

    /// The product to extract, CSM for the clear sky mask or CMI for red band imagery.
    #[clap(short, long, default_value = "CSM")]
    product: String,

    /// Half the width of the box in degrees.
    #[clap(long, default_value_t = 2.0)]
    half_width: f64,

    /// Resolution of the reference grid in km, a multiple of 2.
    #[clap(short, long, default_value_t = 8)]
    resolution: u32,

    /// Directory to keep the reference grid files in.
    #[clap(short, long)]
    #[clap(env = "BOLIDEBOX_GRID_DIR", default_value = ".")]
    grid_dir: PathBuf,

    /// The file to write the pixels to.
    ///
    /// If this is not specified, a name is made from the satellite, product, box size, and
    /// resolution and the file is put in out_dir.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Directory for output files with generated names.
    #[clap(long, default_value = ".")]
    out_dir: PathBuf,

    /// Endpoint template of the image archive, {bucket} is replaced with the bucket name.
    #[clap(long)]
    #[clap(env = "BOLIDEBOX_S3_ENDPOINT", default_value = DEFAULT_ENDPOINT_TEMPLATE)]
    endpoint: String,

    /// Endpoint of the bolide event service.
    #[clap(long)]
    #[clap(env = "BOLIDEBOX_EVENT_ENDPOINT", default_value = DEFAULT_EVENT_ENDPOINT)]
    event_endpoint: String,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Debug)]
enum Target {
    Event(String),
    Point {
        sat: Satellite,
        time: NaiveDateTime,
        lat: f64,
        lon: f64,
        output: Option<PathBuf>,
    },
}

#[derive(Debug)]
struct ExtractOptionsChecked {
    target: Target,
    product: Product,
    half_width: f64,
    resolution: Resolution,
    grid_dir: PathBuf,
    out_dir: PathBuf,
    endpoint: String,
    event_endpoint: String,
    verbose: bool,
}

impl ExtractOptionsChecked {
    /// Name of the file for a satellite when none was given, e.g. GOES-16_CSM_4x4_8km.txt
    fn default_output(&self, sat: Satellite) -> PathBuf {
        let width = 2.0 * self.half_width;
        self.out_dir.join(format!(
            "GOES-{}_{}_{}x{}_{}.txt",
            sat.id(),
            self.product.tag(),
            width,
            width,
            self.resolution
        ))
    }
}

impl Display for ExtractOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f, "\n")?; // yes, two blank lines.
        match &self.target {
            Target::Event(id) => writeln!(f, "     Event: {}", id)?,
            Target::Point {
                sat,
                time,
                lat,
                lon,
                output,
            } => {
                writeln!(f, " Satellite: {}", sat)?;
                writeln!(f, "      Time: {}", time)?;
                writeln!(f, "    Center: ({:.6}, {:.6})", lat, lon)?;
                let output = output.clone().unwrap_or_else(|| self.default_output(*sat));
                writeln!(f, "    Output: {}", output.display())?;
            }
        }
        writeln!(f, "   Product: {}", self.product.imagery())?;
        writeln!(f, "Half Width: {}", self.half_width)?;
        writeln!(f, "Resolution: {}", self.resolution)?;
        writeln!(f, "  Grid Dir: {}", self.grid_dir.display())?;
        writeln!(f, "   Archive: {}", self.endpoint)?;
        writeln!(f, "    Events: {}", self.event_endpoint)?;
        writeln!(f, "\n")?; // yes, two blank lines.

        Ok(())
    }
}

/// Get the command line arguments and check them.
///
/// Everything is validated here so bad input fails before any download.
fn parse_args() -> Result<ExtractOptionsChecked, Box<dyn Error>> {
    let ExtractOptionsInit {
        event,
        sat,
        lat,
        lon,
        time,
        product,
        half_width,
        resolution,
        grid_dir,
        output,
        out_dir,
        endpoint,
        event_endpoint,
        verbose,
    } = ExtractOptionsInit::parse();

    let target = match (event, sat, lat, lon, time) {
        (Some(id), _, _, _, _) => Target::Event(id),
        (None, Some(sat), Some(lat), Some(lon), Some(time)) => Target::Point {
            sat: sat.parse()?,
            time: parse_timestamp(&time)?,
            lat,
            lon,
            output,
        },
        _ => {
            return Err("either --event or all of --sat, --lat, --lon, and --time are required".into())
        }
    };

    if !half_width.is_finite() || half_width <= 0.0 {
        return Err(format!("half width must be positive: {}", half_width).into());
    }

    let checked = ExtractOptionsChecked {
        target,
        product: product.parse()?,
        half_width,
        resolution: Resolution::new(resolution)?,
        grid_dir,
        out_dir,
        endpoint,
        event_endpoint,
        verbose,
    };

    if verbose {
        println!("{}", checked);
    }

    Ok(checked)
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> Result<(), Box<dyn Error>> {
    let opts = parse_args()?;

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .with_module_level("bolidebox", level)
        .init()?;

    let store = S3Client::new(StorageConfig {
        endpoint_template: opts.endpoint.clone(),
        ..StorageConfig::default()
    })?;
    let grids = ReferenceGridCache::new(&opts.grid_dir);
    let extractor = Extractor::new(&store, &grids);

    match &opts.target {
        Target::Event(id) => {
            let event = EventClient::new(&opts.event_endpoint)?.fetch(id)?;
            let time = event.time()?;
            let request = BoundingBoxRequest::new(event.latitude, event.longitude, opts.half_width);

            for sat in event.satellites()? {
                let raster =
                    extractor.extract(sat, opts.product, time, &request, opts.resolution)?;
                save(&raster, &opts.default_output(sat))?;
            }
        }
        Target::Point {
            sat,
            time,
            lat,
            lon,
            output,
        } => {
            let request = BoundingBoxRequest::new(*lat, *lon, opts.half_width);
            let raster = extractor.extract(*sat, opts.product, *time, &request, opts.resolution)?;

            let output = output.clone().unwrap_or_else(|| opts.default_output(*sat));
            save(&raster, &output)?;
        }
    }

    Ok(())
}

fn save(raster: &ExtractedRaster, path: &Path) -> Result<(), Box<dyn Error>> {
    write_matrix(&raster.data, path)?;

    let w = &raster.window;
    let e = &raster.extent;
    println!("     Source: {}", raster.source);
    println!(" Scan Start: {}", raster.scan_start);
    println!("     Window: rows {}..{} cols {}..{}", w.row_min, w.row_max, w.col_min, w.col_max);
    println!(
        "     Extent: ({:.4}, {:.4}) <---> ({:.4}, {:.4})",
        e.min_lat, e.min_lon, e.max_lat, e.max_lon
    );
    if let Some(s) = &raster.scan_extent {
        println!(
            "Scan Extent: x {:.1}..{:.1} m, y {:.1}..{:.1} m",
            s.x_min, s.x_max, s.y_min, s.y_max
        );
    }
    println!("     Output: {}", path.display());

    Ok(())
}
