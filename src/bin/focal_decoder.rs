//! Decoder binary - receives raw FOCAL batches, builds trigger records and
//! publishes them downstream
//!
//! Usage:
//!   cargo run --bin focal_decoder                                   # Use defaults
//!   cargo run --bin focal_decoder -- --config config.toml           # Use config file
//!   cargo run --bin focal_decoder -- -s tcp://localhost:5555 -p tcp://*:5557 --no-pads

use anyhow::Result;
use clap::Parser;
use focal_rs::assembler::EventAssembler;
use focal_rs::common::{DecoderArgs, Message, PipelineError};
use focal_rs::config::Config;
use focal_rs::decoder::{is_end_of_stream, PackedPadDecoder, PackedPixelDecoder};
use futures::{SinkExt, StreamExt};
use tmq::{publish, subscribe, AsZmqSocket, Context};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("focal_rs=info".parse()?))
        .init();

    let args = DecoderArgs::parse();

    // Build configuration
    let config_path = &args.common.config_file;
    let mut config = if std::path::Path::new(config_path).exists() {
        let config = Config::load(config_path)?;
        info!(config_file = %config_path, "Loaded configuration");
        config
    } else {
        info!(config_file = %config_path, "Config file not found, using defaults");
        Config::default()
    };

    // CLI overrides config file
    if !args.sub_addresses.is_empty() {
        config.network.subscribe = args.sub_addresses.clone();
    }
    if let Some(addr) = &args.pub_address {
        config.network.publish = addr.clone();
    }
    if args.no_pads {
        config.decoder.use_pad_data = false;
    }
    if args.no_pixels {
        config.decoder.use_pixel_data = false;
    }
    if args.debug {
        config.decoder.debug_mode = true;
    }
    if let Some(id) = args.routing_id {
        config.decoder.output_routing_id = id;
    }

    let mapper = config.pixel_mapper()?;
    if mapper.is_empty() && config.decoder.use_pixel_data {
        warn!("No [[pixel_mapping]] entries, every pixel fragment will be rejected");
    }
    info!(
        chips = mapper.len(),
        fecs = ?mapper.fec_ids(),
        "Pixel mapping loaded"
    );

    let routing_id = config.decoder.output_routing_id;
    let mut assembler = EventAssembler::configure(
        config.decoder.clone(),
        PackedPadDecoder::new(),
        PackedPixelDecoder::new(),
        mapper,
    );

    // Sockets
    let context = Context::new();
    let (first_addr, other_addrs) = config
        .network
        .subscribe
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("No subscribe address configured"))?;

    let mut sub_socket = subscribe(&context).connect(first_addr)?.subscribe(b"")?;
    info!(address = %first_addr, "Decoder subscribed to upstream");
    for addr in other_addrs {
        sub_socket.get_socket().connect(addr)?;
        info!(address = %addr, "Decoder subscribed to upstream");
    }

    let pub_socket = publish(&context).bind(&config.network.publish)?;
    info!(address = %config.network.publish, "Decoder publishing built events");

    // Sender task: channel → PUB
    let (mut tx, rx) = mpsc::channel::<Message>(config.network.channel_capacity);
    let sender = tokio::spawn(sender_task(rx, pub_socket));

    // Create shutdown channel
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received, initiating shutdown"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
        let _ = shutdown_tx.send(());
    });

    let expected_eos = config.network.subscribe.len();
    let mut eos_received = 0;

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                info!("Decoder received shutdown signal");
                break;
            }

            msg = sub_socket.next() => {
                let frame = match msg {
                    Some(Ok(multipart)) => match multipart.into_iter().next() {
                        Some(frame) => frame,
                        None => continue,
                    },
                    Some(Err(e)) => {
                        warn!(error = %e, "ZMQ receive error");
                        continue;
                    }
                    None => {
                        info!("SUB socket closed");
                        break;
                    }
                };

                if is_end_of_stream(&frame) {
                    eos_received += 1;
                    info!(eos_received, expected_eos, "Upstream end of stream");
                    if eos_received >= expected_eos {
                        break;
                    }
                    continue;
                }

                match assembler.run_cycle(&frame, &mut tx) {
                    Ok(report) => {
                        debug!(
                            seq = report.sequence_number,
                            fragments = report.fragments,
                            decode_errors = report.decode_errors,
                            triggers = report.triggers,
                            "Cycle complete"
                        );
                    }
                    Err(PipelineError::Fatal(e)) => {
                        warn!(error = %e, bytes = frame.len(), "Dropped unparsable batch");
                    }
                    Err(PipelineError::ChannelFull) => {
                        warn!("Channel full, dropped built batch");
                    }
                    Err(e) => {
                        error!(error = %e, "Cycle failed");
                        break;
                    }
                }
            }
        }
    }

    let stats = assembler.teardown()?;
    if let Err(e) = tx.try_send(Message::eos(routing_id)) {
        warn!(error = %e, "Failed to queue EOS");
    }
    drop(tx);
    if let Err(e) = sender.await {
        error!(error = %e, "Sender task failed");
    }

    info!(
        cycles = stats.cycles,
        triggers = stats.triggers_built,
        decode_error_rate = stats.decode_error_rate(),
        "Decoder stopped"
    );
    Ok(())
}

/// Sender task: channel → PUB
async fn sender_task(mut rx: mpsc::Receiver<Message>, mut socket: publish::Publish) {
    while let Some(message) = rx.recv().await {
        match message.to_msgpack() {
            Ok(bytes) => {
                let msg: tmq::Multipart = vec![tmq::Message::from(bytes.as_slice())].into();
                match socket.send(msg).await {
                    Ok(()) => debug!(eos = message.is_eos(), "Sender published message"),
                    Err(e) => warn!(error = %e, "Failed to send message"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to serialize message");
            }
        }
    }

    info!("Sender task completed");
}
