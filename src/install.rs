//! One-shot driver installation
//!
//! Registers the virtual reader with the system smart-card service so the
//! host discovers the emulator's data and event channels. Must run as
//! root; everything else is plain file writes.

use std::fs;
use std::io;
use std::path::Path;

use log::info;

use crate::reader::{DEFAULT_DATA_ADDR, DEFAULT_EVENT_ADDR};

const BUNDLE_DIR: &str = "/usr/lib/pcsc/drivers/ifd-pivert.bundle";
const CONF_DIR: &str = "/etc/reader.conf.d";

const INFO_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleDevelopmentRegion</key>
    <string>English</string>
    <key>CFBundleIdentifier</key>
    <string>org.pivert.ifd-handler</string>
    <key>CFBundleInfoDictionaryVersion</key>
    <string>6.0</string>
    <key>CFBundleName</key>
    <string>ifd-pivert</string>
    <key>CFBundlePackageType</key>
    <string>BNDL</string>
    <key>CFBundleShortVersionString</key>
    <string>0.1.0</string>
    <key>CFBundleVersion</key>
    <string>0.1.0</string>
    <key>ifdCapabilities</key>
    <string>0x00000000</string>
    <key>ifdProtocolSupport</key>
    <string>0x00000003</string>
    <key>ifdVersionNumber</key>
    <string>0x00000001</string>
    <key>ifdManufacturerString</key>
    <string>pivert</string>
    <key>ifdProductString</key>
    <string>PIVert Virtual Reader</string>
</dict>
</plist>
"#;

/// Check that the process is running as root
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Write the reader registration files
pub fn run() -> io::Result<()> {
    if !is_root() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "the installer must be run as root (use sudo)",
        ));
    }

    let bundle_contents = Path::new(BUNDLE_DIR).join("Contents");
    fs::create_dir_all(&bundle_contents)?;
    fs::write(bundle_contents.join("Info.plist"), INFO_PLIST)?;
    info!("wrote {}", bundle_contents.join("Info.plist").display());

    fs::create_dir_all(CONF_DIR)?;
    let conf_path = Path::new(CONF_DIR).join("pivert");
    fs::write(&conf_path, reader_conf())?;
    info!("wrote {}", conf_path.display());

    println!("Virtual reader registered.");
    println!();
    println!("Next steps:");
    println!("  1. Restart the smart-card service: sudo systemctl restart pcscd");
    println!("  2. Start the emulator: pivert <pfx_path> <pfx_password>");
    Ok(())
}

/// Reader configuration pointing the host at the emulator's channels
fn reader_conf() -> String {
    format!(
        r#"# PIVert virtual smart card reader
# The driver connects to the running pivert emulator on these channels.

FRIENDLYNAME      "PIVert Virtual Smart Card"
DEVICENAME        {data};{event}
LIBPATH           {bundle}/Contents/Linux/libifd_pivert.so
CHANNELID         0x00000001
"#,
        data = DEFAULT_DATA_ADDR,
        event = DEFAULT_EVENT_ADDR,
        bundle = BUNDLE_DIR,
    )
}
