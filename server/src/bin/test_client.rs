use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::protocol::RegisterRequest;
use shared::{ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Registers with a running server and prints what it sends back
#[derive(Parser, Debug)]
struct Args {
    /// Server WebSocket URL
    #[clap(short, long, default_value = "ws://127.0.0.1:3000")]
    url: String,
    #[clap(short, long, default_value = "tester")]
    name: String,
    #[clap(short, long, default_value = "password")]
    password: String,
    /// Also open a lobby after registering
    #[clap(short, long)]
    create_room: bool,
    /// Stop after this many seconds without a message
    #[clap(short, long, default_value = "5")]
    idle: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Connecting to {}", args.url);
    let (mut ws, _) = connect_async(args.url.as_str()).await?;

    let register = ClientMessage::Register(RegisterRequest {
        name: args.name.clone(),
        password: args.password.clone(),
    });
    ws.send(Message::Text(register.encode()?)).await?;
    println!("Sent registration for {}", args.name);

    if args.create_room {
        ws.send(Message::Text(ClientMessage::CreateLobby.encode()?))
            .await?;
        println!("Sent create_room");
    }

    loop {
        let next = match timeout(Duration::from_secs(args.idle), ws.next()).await {
            Ok(next) => next,
            Err(_) => {
                println!("No message for {}s, exiting", args.idle);
                break;
            }
        };
        match next {
            Some(Ok(Message::Text(text))) => match ServerMessage::decode(&text) {
                Ok(message) => println!("[{}] {:?}", message.kind(), message),
                Err(e) => println!("Undecodable frame ({}): {}", e, text),
            },
            Some(Ok(Message::Close(frame))) => {
                println!("Server closed the connection: {:?}", frame);
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                println!("Connection error: {}", e);
                break;
            }
            None => break,
        }
    }

    ws.close(None).await.ok();
    Ok(())
}
