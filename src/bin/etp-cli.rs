use std::path::PathBuf;

use clap::{Parser, Subcommand};

use etp_devkit::auth::Credentials;
use etp_devkit::config::{load_config, EtpConfig};
use etp_devkit::handlers::memory::sample_object;
use etp_devkit::handlers::{
    customer_registry, DiscoveryCustomerHandler, NotificationCustomerHandler, StoreCustomerHandler,
};
use etp_devkit::messages::MessageBody;
use etp_devkit::subscription::SubscriptionEvent;
use etp_devkit::{EtpClient, Session};

#[derive(Parser)]
#[command(name = "etp-cli")]
#[command(about = "Command line customer for ETP 1.1/1.2 stores", long_about = None)]
struct Cli {
    /// Server URL; overrides `client.url`.
    #[arg(short, long)]
    url: Option<String>,

    /// ETP version, "1.1" or "1.2".
    #[arg(long = "etp-version")]
    etp_version: Option<String>,

    /// Body encoding, "binary" or "json".
    #[arg(short, long)]
    encoding: Option<String>,

    /// Bearer token.
    #[arg(long, conflicts_with = "username")]
    token: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long, requires = "username")]
    password: Option<String>,

    /// TOML file with a `[client]` section.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the children of a URI
    Resources {
        #[arg(default_value = "/")]
        uri: String,
    },
    /// Fetch one data object
    Get { uri: String },
    /// Store a data object from a file
    Put {
        uri: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "application/x-witsml+xml;version=1.4.1.1")]
        content_type: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Delete a data object
    Delete { uri: String },
    /// Print change notifications below a URI until ctrl-c
    Watch {
        #[arg(default_value = "/")]
        uri: String,
        /// Only these object types (repeatable).
        #[arg(long = "type")]
        object_types: Vec<String>,
        #[arg(long)]
        data: bool,
    },
    /// Measure a Ping/Pong round trip (ETP 1.2)
    Ping,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EtpConfig::default(),
    };
    if let Some(url) = &cli.url {
        config.client.url = url.clone();
    }
    if let Some(version) = &cli.etp_version {
        config.client.version = version.clone();
    }
    if let Some(encoding) = &cli.encoding {
        config.client.encoding = encoding.clone();
    }

    let mut client = EtpClient::new(&config)?;
    if let Some(token) = &cli.token {
        client = client.with_credentials(Some(Credentials::bearer(token.clone())));
    } else if let Some(username) = &cli.username {
        let password = cli.password.clone().unwrap_or_default();
        client = client.with_credentials(Some(Credentials::basic(username.clone(), password)));
    }

    let session = client.connect(customer_registry()).await?;
    let outcome = run(&session, cli.command).await;
    session.close("done").await;
    outcome
}

async fn run(session: &Session, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Resources { uri } => {
            let discovery = session.handler::<DiscoveryCustomerHandler>()?;
            let resources = discovery.get_resources(session, uri).await?;
            println!("{}", serde_json::to_string_pretty(&resources)?);
        }
        Commands::Get { uri } => {
            let store = session.handler::<StoreCustomerHandler>()?;
            match store.get_object(session, uri.clone()).await? {
                Some(object) => {
                    eprintln!("{} ({})", object.resource.uri, object.resource.content_type);
                    println!("{}", String::from_utf8_lossy(&object.data));
                }
                None => eprintln!("{uri}: no data returned"),
            }
        }
        Commands::Put {
            uri,
            name,
            content_type,
            file,
        } => {
            let store = session.handler::<StoreCustomerHandler>()?;
            let mut object = sample_object(&uri, &name, "");
            object.resource.content_type = content_type;
            object.data = tokio::fs::read(&file).await?;
            store.put_object(session, object).await?;
            eprintln!("stored {uri}");
        }
        Commands::Delete { uri } => {
            let store = session.handler::<StoreCustomerHandler>()?;
            store.delete_object(session, uri.clone()).await?;
            eprintln!("deleted {uri}");
        }
        Commands::Watch {
            uri,
            object_types,
            data,
        } => {
            let notifications = session.handler::<NotificationCustomerHandler>()?;
            let mut subscription = notifications.subscribe(session, uri.clone(), object_types, data)?;
            eprintln!("watching {uri} (subscription {})", subscription.key());
            let interrupted = loop {
                let event = tokio::select! {
                    event = subscription.next() => event,
                    _ = tokio::signal::ctrl_c() => break true,
                };
                match event {
                    Some(SubscriptionEvent::Notification(message)) => match message.body() {
                        MessageBody::ChangeNotification(n) => {
                            println!("upsert {} at {}", n.change.data_object.resource.uri, n.change.change_time)
                        }
                        MessageBody::DeleteNotification(n) => {
                            println!("delete {} at {}", n.delete.data_object.resource.uri, n.delete.change_time)
                        }
                        other => println!("{:?}", other.kind()),
                    },
                    Some(SubscriptionEvent::Rejected(exception)) => {
                        return Err(format!("subscription rejected: {}", exception.error_message).into());
                    }
                    Some(SubscriptionEvent::Closed) | None => break false,
                }
            };
            // A closed or rejected subscription is already gone on both sides.
            if interrupted {
                if let Err(e) = subscription.cancel() {
                    eprintln!("cancel failed: {e}");
                }
            }
        }
        Commands::Ping => {
            let rtt = session.ping().await?;
            println!("pong in {:.1} ms", rtt.as_secs_f64() * 1000.0);
        }
    }
    Ok(())
}
