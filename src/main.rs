//! pivert command line entry point
//!
//! Two modes:
//! - `pivert install` registers the virtual reader (root required)
//! - `pivert <pfx_path> <pfx_password>` loads the credential and serves
//!   the emulated card until interrupted

use std::env;
use std::path::Path;
use std::process;

use log::error;

use pivert::card::Credential;
use pivert::crypto::CryptoConfig;
use pivert::install;
use pivert::piv::PIVCard;
use pivert::reader::{self, VirtualReader};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    match args.as_slice() {
        [_, mode] if mode == "install" => {
            if let Err(e) = install::run() {
                eprintln!("install failed: {}", e);
                process::exit(1);
            }
        }
        [_, pfx_path, pfx_password] => {
            let credential = match Credential::from_pkcs12(Path::new(pfx_path), pfx_password) {
                Ok(credential) => credential,
                Err(e) => {
                    eprintln!("failed to load {}: {}", pfx_path, e);
                    process::exit(1);
                }
            };

            let card = PIVCard::new(credential, CryptoConfig::default());
            let virtual_reader = VirtualReader::new(card);
            if let Err(e) = reader::serve_tcp(
                virtual_reader,
                reader::DEFAULT_DATA_ADDR,
                reader::DEFAULT_EVENT_ADDR,
            ) {
                error!("virtual reader failed: {}", e);
                eprintln!("virtual reader failed: {}", e);
                process::exit(1);
            }
        }
        _ => {
            eprintln!("usage: pivert install");
            eprintln!("       pivert <pfx_path> <pfx_password>");
            process::exit(1);
        }
    }
}
