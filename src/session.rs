// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

//! Per-connection session: owns the registry, the negotiated protocol
//! version, status hooks and the outgoing command queue, and applies decoded
//! gateway records to them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::time::{Duration, timeout};
use tracing::{debug, info, trace, warn};

use crate::constants::{DeviceKind, ProtocolVersion, StatusFields};
use crate::devices::{AirCon, AirConStatus, DeviceKey, Room};
use crate::error::{DsAirError, Result};
use crate::event::{EventSender, GatewayEvent};
use crate::protocol::param::Param;
use crate::protocol::result::{GatewayResult, ResultBody, RoomInfo, StatusRecord};
use crate::registry::{AirConUpdate, Registry};

/// What a status hook receives: the merged unit after a capability update,
/// or the merged status after a status update.
#[derive(Debug, Clone, PartialEq)]
pub enum HookUpdate {
    AirCon(AirCon),
    Status(AirConStatus),
}

/// Callback registered for one unit. Runs on the decode task and must
/// return quickly.
pub type StatusHook = Arc<dyn Fn(&HookUpdate) + Send + Sync>;

pub struct Session {
    registry: RwLock<Registry>,
    hooks: RwLock<HashMap<DeviceKey, Vec<StatusHook>>>,
    version: RwLock<ProtocolVersion>,
    outgoing_tx: mpsc::UnboundedSender<Param>,
    outgoing_rx: Mutex<mpsc::UnboundedReceiver<Param>>,
    event_tx: EventSender,
    ready_tx: watch::Sender<bool>,
}

impl Session {
    pub fn new(event_tx: EventSender) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (ready_tx, _) = watch::channel(false);
        Self {
            registry: RwLock::new(Registry::new()),
            hooks: RwLock::new(HashMap::new()),
            version: RwLock::new(ProtocolVersion::Old),
            outgoing_tx,
            outgoing_rx: Mutex::new(outgoing_rx),
            event_tx,
            ready_tx,
        }
    }

    pub fn event_sender(&self) -> &EventSender {
        &self.event_tx
    }

    /// Queue a command for the transport's dispatch task.
    pub fn send_msg(&self, param: Param) -> Result<()> {
        trace!("Queueing {} for {}", param.name(), param.target());
        self.outgoing_tx
            .send(param)
            .map_err(|_| DsAirError::ChannelClosed)
    }

    /// Receiving end of the outgoing queue. Held by the dispatch task of the
    /// live connection; a later connection acquires it once that task ends.
    pub fn outgoing(&self) -> &Mutex<mpsc::UnboundedReceiver<Param>> {
        &self.outgoing_rx
    }

    pub async fn protocol_version(&self) -> ProtocolVersion {
        *self.version.read().await
    }

    pub async fn is_ready(&self) -> bool {
        self.registry.read().await.is_ready()
    }

    /// Wait until discovery completes or `limit` elapses.
    pub async fn wait_ready(&self, limit: Duration) -> Result<()> {
        let mut rx = self.ready_tx.subscribe();
        match timeout(limit, rx.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(DsAirError::ChannelClosed),
            Err(_) => Err(DsAirError::NotReady),
        }
    }

    // --- Accessors ---

    /// Snapshot of every registered climate unit.
    pub async fn get_aircons(&self) -> Vec<AirCon> {
        self.registry.read().await.aircons()
    }

    /// Snapshot of the registered units of one class.
    pub async fn get_aircons_of(&self, kind: DeviceKind) -> Vec<AirCon> {
        self.registry.read().await.aircons_of(kind)
    }

    pub async fn get_aircon(&self, key: &DeviceKey) -> Option<AirCon> {
        self.registry.read().await.aircon(key).cloned()
    }

    /// Snapshot of every room.
    pub async fn get_rooms(&self) -> Vec<Room> {
        self.registry.read().await.rooms().to_vec()
    }

    /// Read access to the registry for callers that need more than one table.
    pub async fn registry(&self) -> tokio::sync::RwLockReadGuard<'_, Registry> {
        self.registry.read().await
    }

    // --- Hooks ---

    pub async fn register_status_hook<F>(&self, key: DeviceKey, hook: F)
    where
        F: Fn(&HookUpdate) + Send + Sync + 'static,
    {
        self.hooks
            .write()
            .await
            .entry(key)
            .or_default()
            .push(Arc::new(hook));
    }

    async fn fire_hooks(&self, key: DeviceKey, update: HookUpdate) {
        let hooks = match self.hooks.read().await.get(&key) {
            Some(hooks) => hooks.clone(),
            None => return,
        };
        for hook in hooks {
            hook(&update);
        }
    }

    // --- Registry mutators ---

    pub async fn set_rooms(&self, info: RoomInfo) {
        self.registry.write().await.set_rooms(info.rooms);
    }

    pub async fn set_aircons(&self, aircons: Vec<AirCon>) {
        self.registry.write().await.set_aircons(aircons);
    }

    pub async fn set_new_aircons(&self, aircons: Vec<AirCon>) {
        self.registry.write().await.set_new_aircons(aircons);
    }

    pub async fn set_bathrooms(&self, aircons: Vec<AirCon>) {
        self.registry.write().await.set_bathrooms(aircons);
    }

    /// Merge an update into a unit and notify its hooks.
    pub async fn update_aircon(&self, key: DeviceKey, update: AirConUpdate) {
        let merged = self.registry.write().await.update_aircon(key, &update);
        let Some((aircon, changed)) = merged else {
            return;
        };
        self.publish(key, &update, aircon, changed).await;
    }

    /// Apply a status-query snapshot and notify hooks.
    pub async fn set_aircon_status(&self, key: DeviceKey, status: AirConStatus) {
        let (merged, became_ready) = {
            let mut registry = self.registry.write().await;
            let merged = registry.set_aircon_status(key, &status);
            (merged, registry.check_ready())
        };
        if let Some((aircon, changed)) = merged {
            self.publish(key, &AirConUpdate::Status(status), aircon, changed)
                .await;
        }
        if became_ready {
            self.mark_ready();
        }
    }

    async fn publish(
        &self,
        key: DeviceKey,
        update: &AirConUpdate,
        aircon: AirCon,
        changed: StatusFields,
    ) {
        match update {
            AirConUpdate::AirCon(_) => {
                let _ = self.event_tx.send(GatewayEvent::AirConUpdated {
                    key,
                    aircon: aircon.clone(),
                });
                self.fire_hooks(key, HookUpdate::AirCon(aircon)).await;
            }
            AirConUpdate::Status(_) => {
                let _ = self.event_tx.send(GatewayEvent::StatusChanged {
                    key,
                    status: aircon.status.clone(),
                    changed,
                });
                self.fire_hooks(key, HookUpdate::Status(aircon.status)).await;
            }
        }
    }

    fn mark_ready(&self) {
        info!("Gateway session ready");
        self.ready_tx.send_replace(true);
        let _ = self.event_tx.send(GatewayEvent::Ready);
    }

    // --- Control ---

    /// Optimistically merge `status` into the unit and queue a control
    /// command. Fields the current protocol version cannot carry are dropped.
    pub async fn control(&self, key: DeviceKey, status: AirConStatus) -> Result<()> {
        let param = self.prepare_control(key, status).await?;
        self.send_msg(param)
    }

    /// Validate and mask a control request, apply it locally and return the
    /// command to send. The caller decides how it goes out.
    pub async fn prepare_control(&self, key: DeviceKey, status: AirConStatus) -> Result<Param> {
        let current = match self.registry.read().await.aircon(&key) {
            Some(ac) => ac.status.clone(),
            None => {
                return Err(DsAirError::UnknownDevice {
                    key: key.to_string(),
                });
            }
        };
        let version = self.protocol_version().await;
        let mut status = status.masked(StatusFields::wire_mask(key.kind, version));
        // both louver axes share one byte on the wire
        if status.fan_direction1.is_some() || status.fan_direction2.is_some() {
            status.fan_direction1 = status.fan_direction1.or(current.fan_direction1);
            status.fan_direction2 = status.fan_direction2.or(current.fan_direction2);
        }
        debug!("Control {}: {:?}", key, status);

        let param = Param::Control {
            key,
            status: status.clone(),
        };
        param.encode_subbody(version)?;
        self.update_aircon(key, AirConUpdate::Status(status)).await;
        Ok(param)
    }

    // --- Record reactions ---

    /// Apply one decoded gateway record.
    pub async fn apply(&self, result: GatewayResult) -> Result<()> {
        trace!("Applying {} (seq {})", result.body.name(), result.sequence);
        match result.body {
            ResultBody::Ack { version } => {
                if let Some(version) = version {
                    self.upgrade_version(version).await;
                }
            }
            ResultBody::CommandResponse { command_id, code } => {
                debug!("Command response for {}: code {}", command_id, code);
                let _ = self
                    .event_tx
                    .send(GatewayEvent::CommandResponse { command_id, code });
            }
            ResultBody::TimeSync { time } => {
                let _ = self.event_tx.send(GatewayEvent::TimeSync { time });
            }
            ResultBody::ErrorCode(record) => {
                if record.code.is_cleared() {
                    info!("Fault cleared on room {} unit {}", record.room, record.unit);
                } else {
                    warn!(
                        "Gateway fault {} on room {} unit {}",
                        record.code, record.room, record.unit
                    );
                }
                let _ = self.event_tx.send(GatewayEvent::ErrorCode(record));
            }
            ResultBody::Weather(weather) => {
                let _ = self.event_tx.send(GatewayEvent::Weather(weather));
            }
            ResultBody::Login { status } => debug!("Login status {}", status),
            ResultBody::ChangePassword { status } => debug!("Change password status {}", status),
            ResultBody::RoomInfo(info) => self.on_room_info(info).await?,
            ResultBody::Handshake { time } => {
                debug!("Handshake at {}", time);
                self.send_msg(Param::all_rooms())?;
            }
            ResultBody::StatusChanged(StatusRecord {
                kind,
                room,
                unit,
                status,
            }) => {
                self.update_aircon(DeviceKey::new(kind, room, unit), AirConUpdate::Status(status))
                    .await;
            }
            ResultBody::QueryStatus(StatusRecord {
                kind,
                room,
                unit,
                status,
            }) => {
                self.set_aircon_status(DeviceKey::new(kind, room, unit), status)
                    .await;
            }
            ResultBody::RecommendedIndoorTemp { temp, outdoor_temp } => {
                let _ = self.event_tx.send(GatewayEvent::RecommendedIndoorTemp {
                    temp,
                    outdoor_temp,
                });
            }
            ResultBody::CapabilityQuery(aircons) => self.on_capabilities(aircons).await?,
            ResultBody::ScheduleSetting(_)
            | ResultBody::ScheduleId(_)
            | ResultBody::ScheduleFinish(_)
            | ResultBody::CommandTransfer(_)
            | ResultBody::ScenarioSetting(_) => {
                debug!("Skipping undecoded {} record", result.body.name());
            }
            ResultBody::Unhandled { .. } => {}
        }
        Ok(())
    }

    async fn upgrade_version(&self, version: ProtocolVersion) {
        let mut current = self.version.write().await;
        if version.is_new() && !current.is_new() {
            info!("Gateway speaks the new protocol");
            *current = version;
            let _ = self
                .event_tx
                .send(GatewayEvent::ProtocolVersionChanged(version));
        }
    }

    async fn on_room_info(&self, info: RoomInfo) -> Result<()> {
        self.set_rooms(info).await;
        self.send_msg(Param::RecommendedIndoorTemp)?;

        let (aircons, new_aircons, bathrooms) =
            self.registry.read().await.partition_room_aircons();
        let (rooms, total) = {
            let registry = self.registry.read().await;
            (
                registry.rooms().len(),
                aircons.len() + new_aircons.len() + bathrooms.len(),
            )
        };
        info!("Discovered {} rooms with {} climate units", rooms, total);

        let mut batches = Vec::new();
        for (kind, units) in [
            (DeviceKind::AirCon, &aircons),
            (DeviceKind::NewAirCon, &new_aircons),
            (DeviceKind::Bathroom, &bathrooms),
        ] {
            if units.is_empty() {
                trace!("No {} units to query", kind);
            }
            batches.extend(Param::capability_queries(kind, units));
        }

        self.set_aircons(aircons).await;
        self.set_new_aircons(new_aircons).await;
        self.set_bathrooms(bathrooms).await;

        for param in batches {
            self.send_msg(param)?;
        }

        let _ = self.event_tx.send(GatewayEvent::RoomsDiscovered {
            rooms,
            aircons: total,
        });

        if self.registry.write().await.check_ready() {
            self.mark_ready();
        }
        Ok(())
    }

    async fn on_capabilities(&self, aircons: Vec<AirCon>) -> Result<()> {
        if self.is_ready().await {
            for ac in aircons {
                self.update_aircon(ac.key(), AirConUpdate::AirCon(ac)).await;
            }
            return Ok(());
        }

        {
            let mut registry = self.registry.write().await;
            for ac in &aircons {
                registry.update_aircon(ac.key(), &AirConUpdate::AirCon(ac.clone()));
            }
        }
        for ac in aircons {
            self.send_msg(Param::QueryStatus { aircon: ac })?;
        }
        Ok(())
    }

    /// Discard all per-connection state. Hooks survive.
    pub async fn reset(&self) {
        *self.registry.write().await = Registry::new();
        *self.version.write().await = ProtocolVersion::Old;
        self.ready_tx.send_replace(false);
        if let Ok(mut rx) = self.outgoing_rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
        debug!("Session state reset");
    }
}
