use std::io;

use clap::Parser;
use env_logger::Env;
use log::{debug, error};

use memcache_demo::config::Settings;
use memcache_demo::{AsyncClient, CacheError, Client};

fn connect(settings: &Settings) -> Result<AsyncClient, CacheError> {
    let url = settings.url()?;
    debug!("connecting to {}", url);
    Ok(Client::connect(url)?.into())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let settings = Settings::parse();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .thread_name("memcache-demo")
        .build();
    let rt = match rt {
        Ok(rt) => rt,
        Err(issue) => {
            error!("Issue starting the event loop due to: {}", issue);
            return;
        }
    };

    rt.block_on(async {
        let mut client = match connect(&settings) {
            Ok(client) => client,
            Err(e) => {
                error!("Memcached error: {}", e);
                return;
            }
        };
        println!("Connection to server successful.");

        let stdout = io::stdout();
        if let Err(e) = settings.scenario().run(&client, &mut stdout.lock()).await {
            error!("Memcached error: {}", e);
        }

        client.close();
        println!("Connection closed.");
    });
}
