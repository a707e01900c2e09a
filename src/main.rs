// CLI that walks the full booking round trip against the live site:
// login, list, book, list, cancel the latest booking, list again, then dump
// the availability window and one group's unavailability for the day.

use anyhow::Context;
use clap::Parser;

use asimut_client::{ClientConfig, RoomDirectory, Session};

#[derive(Parser, Debug)]
#[command(name = "asimut", about = "Book and cancel ESMUC rehearsal rooms")]
struct Args {
    username: String,
    password: String,
    /// Room code, e.g. "A340"
    room: String,
    /// Day as D/M/YYYY, e.g. "1/10/2013"
    date: String,
    /// Start clock, e.g. "21:00"
    start_time: String,
    /// End clock, e.g. "21:30"
    end_time: String,
    description: String,
    /// Override the site base URL
    #[arg(long, default_value_t = ClientConfig::default().base_url)]
    base_url: String,
    /// Room group to query for unavailability
    #[arg(long, default_value = "5")]
    group: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let directory = RoomDirectory::esmuc().context("room directory failed validation")?;
    let config = ClientConfig {
        base_url: args.base_url.clone(),
    };
    let mut session = Session::connect(&config, directory).context("building http client")?;

    session
        .login(&args.username, &args.password)
        .await
        .context("login")?;

    print_bookings(&session.list_bookings().await.context("listing bookings")?);

    let created = session
        .create_booking(
            &args.room,
            &args.date,
            &args.start_time,
            &args.end_time,
            &args.description,
        )
        .await
        .context("creating booking")?;
    println!("booked: {created}");

    print_bookings(&session.list_bookings().await.context("listing bookings")?);

    let latest = session
        .latest_booking_id()
        .context("no booking to cancel")?
        .to_string();
    let cancelled = session
        .cancel_booking(&latest)
        .await
        .context("cancelling booking")?;
    println!("cancelled {latest}: {cancelled}");

    print_bookings(&session.list_bookings().await.context("listing bookings")?);

    if let Some(window) = session.last_window() {
        println!("window: {}", serde_json::to_string_pretty(window)?);
    }

    let unavailability = session
        .fetch_unavailability(&args.date, &args.group)
        .await
        .context("fetching unavailability")?;
    println!(
        "unavailability: {}",
        serde_json::to_string_pretty(&unavailability)?
    );

    Ok(())
}

fn print_bookings(bookings: &[asimut_client::Booking]) {
    println!("current bookings ({}):", bookings.len());
    for booking in bookings {
        println!("  {} {} {}", booking.id, booking.room, booking.time_label);
    }
}
