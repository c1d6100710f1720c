mod output;
mod replay;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::mpsc;

use nearby_logic::{
    Coordinate, Explorer, ExplorerSettings, GeocodeResolver, LocationStatus, PermissionState,
    Place, PlaceDiscoveryService, PlaceQuery, RouteOutcome, RouteRequestCoordinator,
    StateUpdateSender, UNKNOWN_CATEGORY, prelude::*,
};
use nearby_transport::{OrsClient, OverpassClient, http_client};

use crate::replay::ReplayLocation;

#[derive(Parser)]
#[command(version, about = "Find places around you and route to them")]
struct Cli {
    /// JSON file with settings, anything left out keeps its default
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List places around a point
    Discover {
        /// Center as `lat,lon`
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        at: Coordinate,
        /// Search radius in meters, overrides the settings
        #[arg(long, allow_negative_numbers = true)]
        radius: Option<i64>,
    },
    /// Look up a place by name and list places around it
    Search {
        /// Free text such as a city or an address
        text: String,
    },
    /// Get a route between two points
    Route {
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        from: Coordinate,
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        to: Coordinate,
        /// Routing profile, e.g. `foot-walking`
        #[arg(long)]
        profile: Option<String>,
    },
    /// Run a live session fed by a recorded trace of JSON lines
    Track {
        replay: PathBuf,
        /// Delay between two readings of the trace
        #[arg(long, default_value_t = 1000)]
        pace_ms: u64,
        /// Act as if the user refused location access
        #[arg(long)]
        deny: bool,
    },
}

fn parse_coordinate(raw: &str) -> Result<Coordinate, String> {
    let (lat, lon) = raw
        .split_once(',')
        .ok_or_else(|| format!("Expected `lat,lon`, got `{raw}`"))?;
    let lat = lat.trim().parse::<f64>().map_err(|e| format!("Bad latitude: {e}"))?;
    let lon = lon.trim().parse::<f64>().map_err(|e| format!("Bad longitude: {e}"))?;
    let coordinate = Coordinate::new(lat, lon);
    if coordinate.is_valid() {
        Ok(coordinate)
    } else {
        Err(format!("({lat}, {lon}) is not on the globe"))
    }
}

fn load_settings(path: Option<&Path>) -> Result<ExplorerSettings> {
    let Some(path) = path else {
        return Ok(ExplorerSettings::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let settings =
        serde_json::from_str::<ExplorerSettings>(&raw).context("Invalid settings file")?;
    settings.validate().context("Invalid settings file")?;
    Ok(settings)
}

/// Wakes the printing loop, bursts of updates collapse into one
struct ChannelSender(mpsc::Sender<()>);

impl StateUpdateSender for ChannelSender {
    fn send_update(&self) {
        let _ = self.0.try_send(());
    }
}

async fn discover(settings: &ExplorerSettings, at: Coordinate, radius: Option<i64>) -> Result {
    let radius = radius.unwrap_or(settings.radius_meters.into());
    let query = PlaceQuery::build(at, radius, settings.categories.clone())?;
    let service =
        PlaceDiscoveryService::new(OverpassClient::from_build_env()?, settings.retry_discovery);
    let mut places = service.discover(&query).await?;
    Place::sort_by_distance(&mut places, &at);
    output::print_places(&places, &at);
    Ok(())
}

async fn search(settings: &ExplorerSettings, text: &str) -> Result {
    let resolver = GeocodeResolver::new(OrsClient::from_env()?);
    let Some(found) = resolver.resolve_first(text).await? else {
        println!("No match for \"{}\"", text.trim());
        return Ok(());
    };
    println!(
        "{} ({:.5}, {:.5})",
        found.label.as_deref().unwrap_or(text.trim()),
        found.latitude,
        found.longitude
    );
    discover(settings, found.coordinate(), None).await
}

async fn route(from: Coordinate, to: Coordinate, profile: Option<String>) -> Result {
    let mut client = OrsClient::from_env()?;
    if let Some(profile) = profile {
        client = client.with_profile(profile);
    }
    let coordinator = RouteRequestCoordinator::new(client);
    let destination = Place {
        id: "destination".to_string(),
        name: "Destination".to_string(),
        category: UNKNOWN_CATEGORY.to_string(),
        latitude: to.latitude,
        longitude: to.longitude,
    };
    match coordinator.request_route(from, &destination).await? {
        RouteOutcome::Applied(geometry) => {
            println!(
                "{} points, {}",
                geometry.points.len(),
                output::format_distance(geometry.length_meters())
            );
            for point in geometry.points.iter() {
                println!("{:.6},{:.6}", point.latitude, point.longitude);
            }
        }
        RouteOutcome::Superseded => warn!("Route was superseded"),
    }
    Ok(())
}

async fn track(settings: ExplorerSettings, replay: &Path, pace: Duration, deny: bool) -> Result {
    let permission = if deny {
        PermissionState::Denied
    } else {
        PermissionState::Granted
    };
    let location = Arc::new(ReplayLocation::from_file(replay, pace, permission)?);

    let ors = match OrsClient::from_env() {
        Ok(ors) => ors,
        Err(why) => {
            warn!("{why:#}, routing and search won't work");
            OrsClient::new(http_client()?, "")
        }
    };

    let (tx, mut updates) = mpsc::channel(1);
    let explorer = Arc::new(Explorer::new(
        settings,
        location.clone(),
        OverpassClient::from_build_env()?,
        ors.clone(),
        ors,
        ChannelSender(tx),
    ));

    let main = tokio::spawn({
        let explorer = explorer.clone();
        async move { explorer.main_loop().await }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = location.finished() => break,
            Some(()) = updates.recv() => {
                let ui = explorer.get_ui_state().await;
                println!("{}", output::status_line(&ui));
                if ui.location_status == LocationStatus::Unavailable {
                    break;
                }
            }
        }
    }

    explorer.quit().await;
    main.await.context("Explorer task panicked")??;

    let ui = explorer.get_ui_state().await;
    println!("{}", output::status_line(&ui));
    let from = ui.position.map(|p| p.coordinate()).unwrap_or(ui.center);
    output::print_places(&ui.places, &from);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_deref())?;

    match cli.command {
        Commands::Discover { at, radius } => discover(&settings, at, radius).await,
        Commands::Search { text } => search(&settings, &text).await,
        Commands::Route { from, to, profile } => route(from, to, profile).await,
        Commands::Track {
            replay,
            pace_ms,
            deny,
        } => track(settings, &replay, Duration::from_millis(pace_ms), deny).await,
    }
}
