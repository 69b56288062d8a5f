//! Channel daemon process lifecycle.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::simulation::types::IntfRef;
use crate::simulation::world::World;

use super::client::ChannelBridge;
use super::config::DaemonConfig;
use super::protocol::StationId;

/// Where and how to start the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOptions {
    pub binary: PathBuf,
    pub config_path: PathBuf,
    pub socket_path: PathBuf,
    pub request_timeout: Option<Duration>,
    pub connect_deadline: Duration,
    pub retry_interval: Duration,
}

/// A running daemon. Killed when dropped unless it already exited.
pub struct DaemonProcess {
    child: Child,
}

impl DaemonProcess {
    /// Write `config`, start the daemon with it and its socket enabled.
    pub fn spawn(binary: &Path, config: &DaemonConfig, config_path: &Path) -> Result<Self> {
        config.write_to(config_path)?;
        let mut cmd = Command::new(binary);
        cmd.arg("-c").arg(config_path).arg("-s");
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
        let child = cmd.spawn()?;
        log::info!("Started channel daemon {:?} (pid {})", binary, child.id());
        Ok(Self { child })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Whether the process has exited, without blocking.
    pub fn has_exited(&mut self) -> Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    pub fn kill(&mut self) -> Result<()> {
        if self.child.try_wait()?.is_none() {
            self.child.kill()?;
            self.child.wait()?;
            log::info!("Stopped channel daemon (pid {})", self.child.id());
        }
        Ok(())
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            log::warn!("Failed to stop channel daemon: {}", e);
        }
    }
}

/// Cold start: write the config, launch the daemon and connect to it with
/// bounded retry.
pub fn launch(config: &DaemonConfig, options: &LaunchOptions) -> Result<(DaemonProcess, Arc<ChannelBridge>)> {
    let mut process = DaemonProcess::spawn(&options.binary, config, &options.config_path)?;
    let bridge = match ChannelBridge::connect_with_retry(&options.socket_path, options.request_timeout, options.connect_deadline, options.retry_interval) {
        Ok(bridge) => bridge,
        Err(e) => {
            if process.has_exited().unwrap_or(false) {
                log::error!("Channel daemon exited before opening {:?}", options.socket_path);
            }
            return Err(e);
        }
    };
    Ok((process, Arc::new(bridge)))
}

/// Record the station index of every interface of a cold-started daemon,
/// which numbers stations in config order.
pub fn adopt_world(world: &mut World, bridge: &ChannelBridge, config: &DaemonConfig) -> Result<()> {
    let refs: Vec<IntfRef> = world.interfaces().collect();
    for r in refs {
        let mac = world.intf(r).mac;
        if let Some(idx) = config.stations.iter().position(|m| *m == mac) {
            let id = StationId(idx as i32);
            bridge.adopt(mac, id)?;
            world.intf_mut(r).wmediumd_id = Some(id);
        }
    }
    Ok(())
}

/// Register every interface with a daemon that is already running.
pub fn register_world(world: &mut World, bridge: &ChannelBridge) -> Result<()> {
    let refs: Vec<IntfRef> = world.interfaces().collect();
    for r in refs {
        let id = bridge.register(world.intf(r).mac)?;
        world.intf_mut(r).wmediumd_id = Some(id);
    }
    Ok(())
}
