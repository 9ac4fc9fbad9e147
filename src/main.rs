// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

use base::clock::RealClocks;
use failure::{format_err, Error, ResultExt};
use futures::future::FutureExt;
use hyper::service::{make_service_fn, service_fn};
use log::{error, info};
use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;
use tokio::signal::unix::{signal, SignalKind};

mod camera;
mod clip;
mod encoder;
mod frame;
mod json;
mod library;
mod ring;
mod stats;
#[cfg(test)]
mod testutil;
mod trigger;
mod web;

#[derive(StructOpt)]
#[structopt(
    name = "stormwatch",
    about = "Event-triggered storm video recorder: watches a camera for \
             sudden brightness rises and saves clips around them."
)]
struct Args {
    /// Port number to listen on.
    #[structopt(long, default_value = "8080")]
    port: u16,

    /// Address to bind to.
    #[structopt(long, default_value = "localhost")]
    address: String,
}

/// The platform data directory: `%APPDATA%` on Windows, XDG data home
/// otherwise, with the current directory as a last resort.
fn library_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stormwatch")
        .join("videolib")
}

fn main() {
    let args = match Args::from_args_safe() {
        Ok(args) => args,
        Err(e) => {
            // Usage and parse errors both land here; neither is a normal run.
            eprintln!("{}", e.message);
            std::process::exit(1);
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("can't create runtime");
    match rt.block_on(async_run(&args)) {
        Ok(rv) => std::process::exit(rv),
        Err(e) => {
            error!("{}", base::format_chain(&e));
            std::process::exit(1);
        }
    }
}

async fn async_run(args: &Args) -> Result<i32, Error> {
    let addr = (args.address.as_str(), args.port)
        .to_socket_addrs()
        .with_context(|_| format!("unable to resolve --address={}", args.address))?
        .next()
        .ok_or_else(|| format_err!("--address={} resolved to no addresses", args.address))?;

    let library_dir = library_dir();
    let library = Arc::new(library::Library::new(&library_dir)?);
    info!("clip library at {}", library_dir.display());

    let camera = Arc::new(camera::Camera::new(RealClocks::new(), library.clone()));
    camera.start();

    let svc = Arc::new(web::Service::new(camera.clone(), library.clone()));
    let make_svc = make_service_fn(move |_conn| {
        futures::future::ok::<_, std::convert::Infallible>(service_fn({
            let svc = Arc::clone(&svc);
            move |req| Arc::clone(&svc).serve(req)
        }))
    });
    let server = hyper::Server::try_bind(&addr)
        .with_context(|_| format!("unable to bind --address={} --port={}", args.address, args.port))?
        .tcp_nodelay(true)
        .serve(make_svc);

    let mut int = signal(SignalKind::interrupt())?;
    let mut term = signal(SignalKind::terminate())?;
    let shutdown = futures::future::select(Box::pin(int.recv()), Box::pin(term.recv()));

    let (shutdown_tx, shutdown_rx) = futures::channel::oneshot::channel();
    let server = server.with_graceful_shutdown(shutdown_rx.map(|_| ()));
    let server_handle = tokio::spawn(server);

    info!("ready to serve HTTP requests on {}", addr);
    shutdown.await;
    shutdown_tx.send(()).expect("server is still alive");

    info!("shutting down camera");
    camera.stop();

    info!("waiting for HTTP requests to finish");
    server_handle.await??;

    // `library` drops below, draining any clips still in the encoder queue.
    info!("exiting");
    Ok(0)
}
