use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored_json::{Color, ColorMode, ColoredFormatter, Output, Paint, PrettyFormatter};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use wscall::jsonrpc::JsonRpcClient;
use wscall::{Client, ClientConfig, Endpoint, ResponseHandler, WebSocketTransport};

#[derive(Parser, Debug)]
#[command(name = "wscall", version)]
#[command(about = "Call methods on a WebSocket service and listen for its events")]
struct Args {
    /// Host of the service
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// TCP port of the service
    #[arg(long, default_value_t = 80)]
    port: u16,

    /// WebSocket subprotocol to request
    #[arg(long, default_value = "")]
    protocol: String,

    /// Resource path of the WebSocket URL
    #[arg(long, default_value = "/")]
    path: String,

    /// Give up if no connection is up after SECS seconds
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    connect_timeout: u64,

    /// Give up waiting for a response after SECS seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Colorize output
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Print the full error chain on failure
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call a JSON-RPC method and print its result
    Call {
        /// Method name, e.g. player.getState
        method: String,
        /// Parameters as JSON
        params: Option<String>,
    },
    /// Send a raw text message and print the raw response
    Raw { payload: String },
    /// Register for an event and print its notifications
    ///
    /// Without --seconds this listens until the process is killed. No
    /// unregister call is sent in that case; the registration ends with the
    /// connection.
    Listen {
        object: String,
        event: String,
        /// Unregister and exit after N seconds
        #[arg(long, value_name = "N")]
        seconds: Option<u64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ColorChoice {
    Auto,
    On,
    Off,
}

impl ColorChoice {
    fn should_colorize(self) -> bool {
        match self {
            ColorChoice::On => true,
            ColorChoice::Off => false,
            ColorChoice::Auto => ColorMode::should_colorize(Output::StdOut),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wscall=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let should_colorize = args.color.should_colorize();

    if let Err(e) = do_main(&args, should_colorize) {
        let red_bold: fn(w: &str) -> String = if should_colorize {
            |w| w.paint(Color::Red.bold()).to_string()
        } else {
            |w| w.to_string()
        };

        if args.debug {
            eprintln!("{:?}", e);
        } else {
            eprintln!("{} {:#}", red_bold("Error:"), e);
        }
        std::process::exit(1);
    }
}

fn do_main(args: &Args, should_colorize: bool) -> Result<()> {
    let color_mode = if should_colorize {
        ColorMode::On
    } else {
        ColorMode::Off
    };

    let endpoint = Endpoint::new(&args.host, args.port, &args.protocol, &args.path);
    let config = ClientConfig {
        connect_timeout: Some(Duration::from_secs(args.connect_timeout)),
        call_timeout: args.timeout.map(Duration::from_secs),
        drain_timeout: Some(Duration::from_secs(args.connect_timeout)),
        ..Default::default()
    };
    debug!(endpoint = %endpoint, ?config, "starting");

    match args.command {
        Command::Call {
            ref method,
            ref params,
        } => {
            let params = params
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .with_context(|| format!("Failed to parse JSON parameters for '{}'", method))?;

            let rpc = connect_rpc(&endpoint, config, color_mode)?;
            let result = rpc
                .call(method, params)
                .with_context(|| format!("Call to '{}' failed", method))?;
            print_json(&result, color_mode)?;
            rpc.close()?;
        }
        Command::Raw { ref payload } => {
            let client = Client::connect(
                endpoint.clone(),
                WebSocketTransport::new(),
                ResponseHandler::new(),
                config,
            )
            .with_context(|| format!("Failed to connect to '{}'", endpoint))?;
            let response = client.call(payload.as_str()).context("Call failed")?;
            println!("{}", response);
            client.close()?;
        }
        Command::Listen {
            ref object,
            ref event,
            seconds,
        } => {
            let rpc = connect_rpc(&endpoint, config, color_mode)?;
            let accepted = rpc
                .register_event(object, event)
                .with_context(|| format!("Failed to register for '{}.{}'", object, event))?;
            if !accepted {
                anyhow::bail!("Service refused registration for '{}.{}'", object, event);
            }

            let started = Instant::now();
            loop {
                thread::sleep(Duration::from_millis(200));
                if seconds.is_some_and(|s| started.elapsed() >= Duration::from_secs(s)) {
                    break;
                }
            }

            rpc.unregister_event(object, event)
                .with_context(|| format!("Failed to unregister from '{}.{}'", object, event))?;
            rpc.close()?;
        }
    }

    Ok(())
}

fn connect_rpc(
    endpoint: &Endpoint,
    config: ClientConfig,
    color_mode: ColorMode,
) -> Result<JsonRpcClient> {
    JsonRpcClient::connect(
        endpoint.clone(),
        WebSocketTransport::new(),
        move |event: &str| match serde_json::from_str::<Value>(event) {
            Ok(value) => {
                let _ = print_json(&value, color_mode);
            }
            Err(_) => println!("{}", event),
        },
        config,
    )
    .with_context(|| format!("Failed to connect to '{}'", endpoint))
}

fn print_json(value: &Value, color_mode: ColorMode) -> Result<()> {
    let cf = ColoredFormatter::new(PrettyFormatter::new());
    println!(
        "{}",
        cf.to_colored_json(value, color_mode)
            .with_context(|| format!("Failed to print json for '{}'", value))?
    );
    Ok(())
}
