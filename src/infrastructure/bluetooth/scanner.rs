//! BLE Scanner Module
//!
//! Lists nearby LE advertisers while a probe's scan window is open.

use crate::domain::address::BluetoothAddress;
use crate::domain::models::{AppEvent, MessageSeverity, ScannedDevice, StatusMessage};
use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Foundation::TypedEventHandler;

/// Advertisement watcher reporting every device it hears
pub struct BleScanner {
    watcher: Option<BluetoothLEAdvertisementWatcher>,
}

impl BleScanner {
    pub fn new() -> Self {
        Self { watcher: None }
    }

    /// Start scanning, replacing any scan already running
    pub fn start(&mut self, event_sender: mpsc::UnboundedSender<AppEvent>) -> Result<()> {
        self.stop()?;

        info!("Starting BLE scan");
        let _ = event_sender.send(AppEvent::LogMessage(StatusMessage::new(
            "Scanning for nearby devices...",
            MessageSeverity::Info,
        )));

        let watcher = BluetoothLEAdvertisementWatcher::new()?;
        watcher.SetScanningMode(BluetoothLEScanningMode::Active)?;

        let sender = event_sender.clone();
        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let name = args.Advertisement()?.LocalName()?.to_string();
                    let address = BluetoothAddress::from_u64(args.BluetoothAddress()?);
                    let rssi = args.RawSignalStrengthInDBm()?;

                    debug!("LE Device: {} {} {} dBm", name, address, rssi);
                    let _ = sender.send(AppEvent::DeviceFound(ScannedDevice {
                        name: if name.is_empty() {
                            "Unknown".to_string()
                        } else {
                            name
                        },
                        address,
                        signal_strength: rssi,
                    }));
                }
                Ok(())
            },
        );

        watcher.Received(&handler)?;
        watcher.Start()?;
        self.watcher = Some(watcher);

        Ok(())
    }

    /// Stop scanning. Returns whether a scan was running.
    pub fn stop(&mut self) -> Result<bool> {
        if let Some(watcher) = self.watcher.take() {
            info!("Stopping BLE scan");
            watcher.Stop()?;
            return Ok(true);
        }
        Ok(false)
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
