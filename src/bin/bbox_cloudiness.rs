use bolidebox::{
    parse_timestamp, BoundingBoxRequest, EventClient, Extractor, ReferenceGridCache, Resolution,
    S3Client, Satellite, StorageConfig, DEFAULT_ENDPOINT_TEMPLATE, DEFAULT_EVENT_ENDPOINT,
};
use chrono::NaiveDateTime;
use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::{
    error::Error,
    fmt::{self, Display},
    path::PathBuf,
};

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Estimate how cloudy it was around a bolide.
///
/// The cloudiness is the fraction of the clear sky mask pixels in a box around the point that were
/// flagged as cloudy in the full disk scan closest to the time. For an event, it is averaged over
/// every satellite that detected it.
///
#[derive(Debug, Parser)]
#[clap(name = "bbox_cloudiness")]
#[clap(author, version, about)]
struct CloudinessOptionsInit {
    /// The id of an event in the bolide database.
    #[clap(short, long)]
    #[clap(required_unless_present_all = &["sat", "lat", "lon", "time"])]
    #[clap(conflicts_with_all = &["sat", "lat", "lon", "time"])]
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
    },
}

#[derive(Debug)]
struct CloudinessOptionsChecked {
    target: Target,
    half_width: f64,
    resolution: Resolution,
    grid_dir: PathBuf,
    endpoint: String,
    event_endpoint: String,
    verbose: bool,
}

impl Display for CloudinessOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f, "\n")?; // yes, two blank lines.
        match &self.target {
            Target::Event(id) => writeln!(f, "     Event: {}", id)?,
            Target::Point {
                sat,
                time,
                lat,
                lon,
            } => {
                writeln!(f, " Satellite: {}", sat)?;
                writeln!(f, "      Time: {}", time)?;
                writeln!(f, "    Center: ({:.6}, {:.6})", lat, lon)?;
            }
        }
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
fn parse_args() -> Result<CloudinessOptionsChecked, Box<dyn Error>> {
    let CloudinessOptionsInit {
        event,
        sat,
        lat,
        lon,
        time,
        half_width,
        resolution,
        grid_dir,
        endpoint,
        event_endpoint,
        verbose,
    } = CloudinessOptionsInit::parse();

    let target = match (event, sat, lat, lon, time) {
        (Some(id), _, _, _, _) => Target::Event(id),
        (None, Some(sat), Some(lat), Some(lon), Some(time)) => Target::Point {
            sat: sat.parse()?,
            time: parse_timestamp(&time)?,
            lat,
            lon,
        },
        _ => {
            return Err("either --event or all of --sat, --lat, --lon, and --time are required".into())
        }
    };

    if !half_width.is_finite() || half_width <= 0.0 {
        return Err(format!("half width must be positive: {}", half_width).into());
    }

    let checked = CloudinessOptionsChecked {
        target,
        half_width,
        resolution: Resolution::new(resolution)?,
        grid_dir,
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

    let cloudiness = match &opts.target {
        Target::Event(id) => {
            let event = EventClient::new(&opts.event_endpoint)?.fetch(id)?;
            log::info!(
                "event {} detected by {} at {}",
                id,
                event.detected_by,
                event.datetime
            );
            extractor.event_cloudiness(&event, opts.half_width, opts.resolution)?
        }
        Target::Point {
            sat,
            time,
            lat,
            lon,
        } => {
            let request = BoundingBoxRequest::new(*lat, *lon, opts.half_width);
            extractor.cloudiness(*sat, *time, &request, opts.resolution)?
        }
    };

    println!("Cloudiness: {:.4}", cloudiness);

    Ok(())
}
