use std::net::Ipv4Addr;
use std::str::FromStr;

use clap::Parser;
use log::info;

use ardrone_bridge::config::{self, Args};
use ardrone_bridge::proto::DEFAULT_REPEAT;
use ardrone_bridge::{BootstrapRoutine, Dispatcher};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(verbosity_to_level(args.verbosity))
        .init();

    if args.test_mode {
        info!("running bootstrap routine against the factory-default drone");
        let bootstrap = BootstrapRoutine::new(DEFAULT_REPEAT, args.verbosity)?;
        let ok = bootstrap.run()?;
        if ok {
            info!("bootstrap succeeded: demo navdata stream is up");
        } else {
            info!("bootstrap gave up without seeing the demo mask");
        }
        return Ok(());
    }

    let peers = config::load_peer_table(&args.peer_file)?;
    info!("loaded {} peer(s) from {:?}", peers.len(), args.peer_file);
    if args.verbosity > 1 {
        for peer in peers.iter() {
            let peer = peer.borrow();
            info!("{} mapped to {} (synth port {})", peer.name, peer.ip, peer.synth_port);
        }
    }

    let bind_host = Ipv4Addr::from_str(&args.bind_host)
        .map_err(|source| anyhow::anyhow!("invalid -l/--local-host {:?}: {source}", args.bind_host))?;

    let mut dispatcher = Dispatcher::new(peers, bind_host, args.mav_port, DEFAULT_REPEAT, args.verbosity)?;
    info!("waiting for the ground control station");
    dispatcher.wait_heartbeat()?;
    info!("ground control station seen, entering the event loop");
    dispatcher.run()?;

    Ok(())
}

fn verbosity_to_level(verbosity: u8) -> log::LevelFilter {
    match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}
