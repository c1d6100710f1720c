use nearby_logic::{Coordinate, ExplorerUiState, LocationStatus, Place};

/// Distances under a kilometer in meters, the rest in km with one decimal
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{meters:.0} m")
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

pub fn place_line(place: &Place, from: &Coordinate) -> String {
    format!(
        "{:>9}  {} [{}] #{}",
        format_distance(place.distance_from(from)),
        place.name,
        place.category,
        place.id
    )
}

pub fn print_places(places: &[Place], from: &Coordinate) {
    if places.is_empty() {
        println!("No places found");
        return;
    }
    for place in places {
        println!("{}", place_line(place, from));
    }
}

pub fn status_line(ui: &ExplorerUiState) -> String {
    let status = match ui.location_status {
        LocationStatus::Unknown => "waiting",
        LocationStatus::Tracking => "tracking",
        LocationStatus::Denied => "location denied",
        LocationStatus::Unavailable => "location unavailable",
    };
    let mut line = format!(
        "[{status}] {} | center ({:.5}, {:.5}) | {} places",
        ui.speed,
        ui.center.latitude,
        ui.center.longitude,
        ui.places.len()
    );
    if let Some(route) = &ui.route {
        line.push_str(&format!(
            " | route to #{} ({})",
            route.request.destination_id,
            format_distance(route.geometry.length_meters())
        ));
    }
    if let Some(err) = &ui.last_error {
        line.push_str(&format!(" | {err}"));
    }
    line
}
