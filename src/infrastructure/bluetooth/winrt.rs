//! WinRT Bluetooth Backend
//!
//! [`AdapterControl`] and [`GattTransport`] on top of the Windows Runtime
//! Bluetooth APIs.
//!
//! WinRT performs the ATT MTU exchange on its own and only exposes the result
//! as `GattSession::MaxPduSize`. MTU requests go through a [`PduExchange`]
//! fed by `MaxPduSizeChanged`, so the answer is the size the link agreed on.

use crate::domain::address::BluetoothAddress;
use crate::domain::error::TransportError;
use crate::domain::models::AppEvent;
use crate::infrastructure::bluetooth::pdu_exchange::{PduExchange, ATT_DEFAULT_MTU, PDU_SETTLE_TIMEOUT};
use crate::infrastructure::bluetooth::scanner::BleScanner;
use crate::infrastructure::bluetooth::{
    AdapterControl, AdapterState, ConnectionHandle, GattStatus, GattTransport, LinkState,
    NotificationSink, TransportKind, TransportNotification,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use windows::Devices::Bluetooth::Advertisement::BluetoothLEAdvertisementPublisher;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCommunicationStatus, GattSession, GattSessionStatus, GattSessionStatusChangedEventArgs,
};
use windows::Devices::Bluetooth::{
    BluetoothAdapter, BluetoothCacheMode, BluetoothError, BluetoothLEDevice,
};
use windows::Devices::Radios::{Radio, RadioAccessStatus, RadioState};
use windows::core::IInspectable;
use windows::Foundation::TypedEventHandler;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Default adapter and its radio
pub struct WinRtAdapter {
    runtime: Handle,
    scanner: Arc<Mutex<BleScanner>>,
    scan_generation: Arc<AtomicU64>,
    publisher: Arc<Mutex<Option<BluetoothLEAdvertisementPublisher>>>,
}

impl WinRtAdapter {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            scanner: Arc::new(Mutex::new(BleScanner::new())),
            scan_generation: Arc::new(AtomicU64::new(0)),
            publisher: Arc::new(Mutex::new(None)),
        }
    }

    async fn default_adapter() -> Option<BluetoothAdapter> {
        let adapter = BluetoothAdapter::GetDefaultAsync().ok()?.await.ok()?;
        match adapter.IsLowEnergySupported() {
            Ok(true) => Some(adapter),
            _ => {
                warn!("Default Bluetooth adapter does not support LE");
                None
            }
        }
    }

    async fn radio() -> Option<Radio> {
        let adapter = Self::default_adapter().await?;
        adapter.GetRadioAsync().ok()?.await.ok()
    }
}

#[async_trait]
impl AdapterControl for WinRtAdapter {
    async fn state(&self) -> AdapterState {
        match Self::radio().await {
            None => AdapterState::Unavailable,
            Some(radio) => match radio.State() {
                Ok(RadioState::On) => AdapterState::Enabled,
                Ok(state) => {
                    debug!("Bluetooth radio state: {:?}", state);
                    AdapterState::Disabled
                }
                Err(e) => {
                    warn!("Could not read radio state: {}", e);
                    AdapterState::Unavailable
                }
            },
        }
    }

    async fn request_enable(&self) -> Result<bool> {
        let access = Radio::RequestAccessAsync()?.await?;
        if access != RadioAccessStatus::Allowed {
            warn!("Radio access not granted: {:?}", access);
            return Ok(false);
        }

        let radio = Self::radio()
            .await
            .ok_or_else(|| anyhow::anyhow!("Bluetooth radio not found"))?;
        let result = radio.SetStateAsync(RadioState::On)?.await?;
        info!("Radio enable result: {:?}", result);
        Ok(result == RadioAccessStatus::Allowed)
    }

    async fn request_discoverable(&self, duration: Duration) -> Result<()> {
        let publisher = BluetoothLEAdvertisementPublisher::new()?;
        publisher.Start()?;
        info!("Advertising for {:?}", duration);

        if let Some(previous) = lock(&self.publisher).replace(publisher.clone()) {
            let _ = previous.Stop();
        }

        let slot = self.publisher.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = publisher.Stop();
            let mut current = lock(&slot);
            if current.as_ref() == Some(&publisher) {
                *current = None;
            }
            info!("Discoverable window closed");
        });

        Ok(())
    }

    async fn start_scan(
        &self,
        window: Duration,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Result<()> {
        lock(&self.scanner).start(events.clone())?;
        let generation = self.scan_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let scanner = self.scanner.clone();
        let current = self.scan_generation.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            // A newer scan owns the watcher now
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            match lock(&scanner).stop() {
                Ok(true) => {
                    info!("Scan window of {:?} elapsed", window);
                    let _ = events.send(AppEvent::ScanFinished);
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to stop scan: {}", e),
            }
        });

        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.scan_generation.fetch_add(1, Ordering::SeqCst);
        lock(&self.scanner).stop()?;
        Ok(())
    }
}

struct Link {
    sink: NotificationSink,
    device: Option<BluetoothLEDevice>,
    session: Option<GattSession>,
    exchange: Option<Arc<PduExchange>>,
}

/// GATT client links keyed by [`ConnectionHandle`]
pub struct WinRtTransport {
    runtime: Handle,
    links: Arc<Mutex<HashMap<ConnectionHandle, Link>>>,
    next_id: AtomicU64,
}

impl WinRtTransport {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            links: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    async fn open_link(
        handle: ConnectionHandle,
        address: BluetoothAddress,
        links: Arc<Mutex<HashMap<ConnectionHandle, Link>>>,
    ) -> Result<()> {
        let device = BluetoothLEDevice::FromBluetoothAddressAsync(address.as_u64())?.await?;
        info!("Got device, connecting: {}", address);

        let session = GattSession::FromDeviceIdAsync(&device.BluetoothDeviceId()?)?.await?;

        let sink = match lock(&links).get(&handle) {
            Some(link) => link.sink.clone(),
            None => {
                debug!("Connection {} closed while opening", handle);
                let _ = session.Close();
                let _ = device.Close();
                return Ok(());
            }
        };

        let status_sink = sink.clone();
        session.SessionStatusChanged(&TypedEventHandler::new(
            move |_: windows::core::Ref<GattSession>,
                  args: windows::core::Ref<GattSessionStatusChangedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let state = match args.Status()? {
                        GattSessionStatus::Active => LinkState::Connected,
                        _ => LinkState::Disconnected,
                    };
                    let status = if args.Error()? == BluetoothError::Success {
                        GattStatus::SUCCESS
                    } else {
                        GattStatus::FAILURE
                    };
                    let _ = status_sink
                        .send(TransportNotification::ConnectionStateChanged { state, status });
                }
                Ok(())
            },
        ))?;

        let exchange = Arc::new(PduExchange::new(sink.clone(), session.MaxPduSize()?));
        let pdu_exchange = exchange.clone();
        session.MaxPduSizeChanged(&TypedEventHandler::new(
            move |sender: windows::core::Ref<GattSession>, _: windows::core::Ref<IInspectable>| {
                if let Some(session) = sender.as_ref() {
                    pdu_exchange.size_changed(session.MaxPduSize()?);
                }
                Ok(())
            },
        ))?;
        // The exchange may have finished before the handler was registered
        let current = session.MaxPduSize()?;
        if current > ATT_DEFAULT_MTU && !exchange.is_settled() {
            exchange.size_changed(current);
        }

        session.SetMaintainConnection(true)?;
        let active = session.SessionStatus()? == GattSessionStatus::Active;

        match lock(&links).get_mut(&handle) {
            Some(link) => {
                link.device = Some(device);
                link.session = Some(session);
                link.exchange = Some(exchange);
            }
            None => {
                let _ = session.Close();
                let _ = device.Close();
                return Ok(());
            }
        }

        if active {
            let _ = sink.send(TransportNotification::ConnectionStateChanged {
                state: LinkState::Connected,
                status: GattStatus::SUCCESS,
            });
        }
        Ok(())
    }
}

impl GattTransport for WinRtTransport {
    fn connect(
        &self,
        address: BluetoothAddress,
        kind: TransportKind,
        notifications: NotificationSink,
    ) -> std::result::Result<ConnectionHandle, TransportError> {
        let TransportKind::LowEnergy = kind;

        let handle = ConnectionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.links).insert(
            handle,
            Link {
                sink: notifications,
                device: None,
                session: None,
                exchange: None,
            },
        );

        let links = self.links.clone();
        self.runtime.spawn(async move {
            if let Err(e) = Self::open_link(handle, address, links.clone()).await {
                let err = TransportError::Platform(e.to_string());
                warn!("GATT session to {} failed: {}", address, err);
                if let Some(link) = lock(&links).get(&handle) {
                    let _ = link
                        .sink
                        .send(TransportNotification::ConnectionStateChanged {
                            state: LinkState::Disconnected,
                            status: GattStatus::FAILURE,
                        });
                }
            }
        });

        Ok(handle)
    }

    fn request_mtu(&self, handle: ConnectionHandle, mtu: u16) -> bool {
        let (session, exchange) = {
            let links = lock(&self.links);
            match links.get(&handle) {
                Some(Link {
                    session: Some(session),
                    exchange: Some(exchange),
                    ..
                }) => (session.clone(), exchange.clone()),
                _ => return false,
            }
        };

        if exchange.request(mtu) {
            return true;
        }

        // Still at the ATT default, give the platform time to finish its exchange
        self.runtime.spawn(async move {
            tokio::time::sleep(PDU_SETTLE_TIMEOUT).await;
            match session.MaxPduSize() {
                Ok(size) => exchange.settle(size),
                Err(e) => {
                    warn!("Could not read MaxPduSize: {}", e);
                    exchange.settle(ATT_DEFAULT_MTU);
                }
            }
        });
        true
    }

    fn discover_services(&self, handle: ConnectionHandle) -> bool {
        let (device, sink) = {
            let links = lock(&self.links);
            match links.get(&handle) {
                Some(Link {
                    device: Some(device),
                    sink,
                    ..
                }) => (device.clone(), sink.clone()),
                _ => return false,
            }
        };

        self.runtime.spawn(async move {
            let status = match Self::discover(&device).await {
                Ok(true) => GattStatus::SUCCESS,
                Ok(false) => GattStatus::FAILURE,
                Err(e) => {
                    warn!("Service discovery error: {}", e);
                    GattStatus::FAILURE
                }
            };
            let _ = sink.send(TransportNotification::ServicesDiscovered { status });
        });
        true
    }

    fn close(&self, handle: ConnectionHandle) {
        let Some(link) = lock(&self.links).remove(&handle) else {
            return;
        };
        if let Some(session) = link.session {
            let _ = session.SetMaintainConnection(false);
            let _ = session.Close();
        }
        if let Some(device) = link.device {
            let _ = device.Close();
        }
        info!("Closed connection {}", handle);
    }
}

impl WinRtTransport {
    async fn discover(device: &BluetoothLEDevice) -> Result<bool> {
        let result = device
            .GetGattServicesWithCacheModeAsync(BluetoothCacheMode::Uncached)?
            .await?;
        let status = result.Status()?;
        if status == GattCommunicationStatus::Success {
            info!("Discovered {} services", result.Services()?.Size()?);
            Ok(true)
        } else {
            warn!("onServicesDiscovered received: {:?}", status);
            Ok(false)
        }
    }
}
