//! Manual probe client.
//!
//! Signs and sends a `hello`, switches to dancing, then walks toward a
//! goal while submitting marks, printing every snapshot the server
//! publishes back. The user's `token` field must already be present in
//! the store (the login service writes it); pass the same secret here.

use clap::Parser;
use serde_json::json;
use server::auth::compute_hmac;
use shared::{Envelope, GameSnapshot};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// User identifier to send as
    #[clap(short, long)]
    user_id: String,
    /// Per-user secret matching the `token` on file
    #[clap(long)]
    secret: String,
    /// Location to enter
    #[clap(short, long)]
    location: String,
}

fn signed(user_id: &str, event: &str, contents: serde_json::Value, secret: &str) -> Vec<u8> {
    let envelope = Envelope {
        user_id: user_id.to_string(),
        event: event.to_string(),
        hmac: compute_hmac(&contents.to_string(), secret),
        contents,
    };
    serde_json::to_vec(&envelope).expect("envelope serializes")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let server_addr: SocketAddr = args.server.parse()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    println!("Sending hello for location {}", args.location);
    let hello = signed(&args.user_id, "hello", json!(args.location), &args.secret);
    socket.send_to(&hello, server_addr).await?;

    let status = signed(&args.user_id, "status", json!("dancing"), &args.secret);
    socket.send_to(&status, server_addr).await?;

    let goal = json!({ "latitude": 1.0, "longitude": 1.0 });
    let movement = signed(&args.user_id, "move", goal, &args.secret);
    socket.send_to(&movement, server_addr).await?;

    let mut buf = [0u8; 8192];
    for round in 0..100 {
        // A mark every second or so keeps the session alive and shows
        // up in the scores once the beat is judged.
        if round % 20 == 0 {
            let mark = signed(&args.user_id, "mark", json!("perfect"), &args.secret);
            socket.send_to(&mark, server_addr).await?;
        }

        match tokio::time::timeout(Duration::from_millis(250), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => match serde_json::from_slice::<GameSnapshot>(&buf[..len]) {
                Ok(snapshot) => {
                    println!(
                        "[{}] {} players, song: {:?}, arrows: {:?}, scores: {:?}",
                        snapshot.location_title,
                        snapshot.players.len(),
                        snapshot.song.as_ref().map(|s| &s.title),
                        snapshot.arrow_combination,
                        snapshot.scores,
                    );
                    for player in &snapshot.players {
                        println!(
                            "  {}{} at ({:.2}, {:.2}) [{:?}]",
                            player.username,
                            if player.is_main { " (you)" } else { "" },
                            player.latitude,
                            player.longitude,
                            player.status,
                        );
                    }
                }
                Err(e) => println!("Failed to decode snapshot: {}", e),
            },
            Ok(Err(e)) => println!("Error receiving snapshot: {}", e),
            Err(_) => {} // no snapshot this window
        }

        sleep(Duration::from_millis(50)).await;
    }

    println!("Test client finished");
    Ok(())
}
