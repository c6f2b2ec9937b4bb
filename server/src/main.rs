use clap::Parser;
use server::bootstrap;
use server::catalog::Catalog;
use server::network::Server;
use server::store::Store;
use std::path::PathBuf;
use std::sync::Arc;

/// Main-method of the application.
/// Parses command-line arguments, connects the store, seeds the
/// locations and runs the UDP server loop until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Redis connection URL
        #[clap(short, long, default_value = "redis://127.0.0.1/")]
        redis_url: String,
        /// Path to the song/location catalog file
        #[clap(short, long, default_value = "catalog.json")]
        catalog: PathBuf,
    }

    env_logger::init();
    let args = Args::parse();

    let catalog = Arc::new(Catalog::load(&args.catalog)?);
    let store = Store::connect(&args.redis_url).await?;

    // Wipe stale live state and start one dance-floor daemon per
    // catalog location.
    bootstrap::reset_state(&store, &catalog).await?;

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, store).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server loop failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
