// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

//! Room and device tables for one gateway session.
//!
//! Devices live in two arenas owned by the registry: climate units
//! ([`AirCon`]) and everything else ([`Device`]). Rooms refer to them by
//! index. Climate units are also indexed by [`DeviceKey`] for status routing.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::constants::{DeviceKind, StatusFields};
use crate::devices::{AirCon, AirConStatus, Device, DeviceKey, Room};
use crate::protocol::result::RoomRecord;

/// Payload of an [`Registry::update_aircon`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum AirConUpdate {
    /// New static capability/identity fields; the live status is kept.
    AirCon(AirCon),
    /// Partial status, merged field by field.
    Status(AirConStatus),
}

#[derive(Debug, Default)]
pub struct Registry {
    rooms: Vec<Room>,
    climate: Vec<AirCon>,
    devices: Vec<Device>,
    aircons: Vec<usize>,
    new_aircons: Vec<usize>,
    bathrooms: Vec<usize>,
    index: HashMap<DeviceKey, usize>,
    reported: HashSet<DeviceKey>,
    rooms_loaded: bool,
    ready: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the rooms of a room-info response into the tables.
    ///
    /// Rooms are matched by id and units by [`DeviceKey`], so a repeated
    /// response keeps every known unit with its capabilities, status and
    /// readiness. Empty names never overwrite known ones.
    ///
    /// A room keeps at most one climate unit; a later unit in the same room
    /// replaces an earlier one. The room alias, when set, becomes the alias
    /// of its climate unit.
    pub fn set_rooms(&mut self, records: Vec<RoomRecord>) {
        for record in records {
            let room_idx = match self.rooms.iter().position(|r| r.id == record.id) {
                Some(idx) => idx,
                None => {
                    self.rooms.push(Room::new(record.id));
                    self.rooms.len() - 1
                }
            };
            let mut room = std::mem::take(&mut self.rooms[room_idx]);
            keep_or_replace(&mut room.name, record.name);
            keep_or_replace(&mut room.alias, record.alias);
            keep_or_replace(&mut room.icon, record.icon);

            let last_climate = record
                .units
                .iter()
                .rposition(|u| u.kind.is_some_and(DeviceKind::is_air_con));

            for (pos, unit) in record.units.into_iter().enumerate() {
                match unit.kind {
                    Some(kind) if kind.is_air_con() => {
                        if Some(pos) != last_climate {
                            debug!("Room {} unit {} replaced by a later unit", room.id, unit.unit_id);
                            continue;
                        }
                        let idx = self.place_climate(&mut room, kind, unit.unit_id);
                        let ac = &mut self.climate[idx];
                        keep_or_replace(&mut ac.name, unit.name);
                        keep_or_replace(&mut ac.alias, unit.alias);
                    }
                    kind => {
                        let idx = match self.devices.iter().position(|d| {
                            d.device_id == unit.device_id
                                && d.room_id == room.id
                                && d.unit_id == unit.unit_id
                        }) {
                            Some(idx) => {
                                let device = &mut self.devices[idx];
                                keep_or_replace(&mut device.name, unit.name);
                                keep_or_replace(&mut device.alias, unit.alias);
                                idx
                            }
                            None => {
                                self.devices.push(Device {
                                    device_id: unit.device_id,
                                    kind,
                                    room_id: room.id,
                                    unit_id: unit.unit_id,
                                    name: unit.name,
                                    alias: unit.alias,
                                });
                                self.devices.len() - 1
                            }
                        };
                        match kind {
                            Some(DeviceKind::Geothermic) => room.geothermic = Some(idx),
                            Some(DeviceKind::Ventilation) => room.ventilation = Some(idx),
                            Some(DeviceKind::Hd) => room.hd_room = true,
                            _ => {}
                        }
                    }
                }
            }

            if let Some(idx) = room.air_con
                && !room.alias.is_empty()
            {
                self.climate[idx].alias = room.alias.clone();
            }
            self.rooms[room_idx] = room;
        }

        self.rooms_loaded = true;
    }

    /// Arena slot of the climate unit `(kind, room, unit)`. A known unit
    /// keeps its slot; a new one takes over the room's previous unit slot or
    /// is appended.
    fn place_climate(&mut self, room: &mut Room, kind: DeviceKind, unit_id: u8) -> usize {
        let key = DeviceKey::new(kind, room.id, unit_id);
        let idx = match self.climate.iter().position(|ac| ac.key() == key) {
            Some(idx) => idx,
            None => match room.air_con {
                Some(idx) => {
                    let old = self.climate[idx].key();
                    self.index.remove(&old);
                    self.reported.remove(&old);
                    self.climate[idx] = AirCon::new(kind, room.id, unit_id);
                    idx
                }
                None => {
                    self.climate.push(AirCon::new(kind, room.id, unit_id));
                    self.climate.len() - 1
                }
            },
        };
        room.air_con = Some(idx);
        idx
    }

    /// Climate units of every room, split into `(aircons, new_aircons,
    /// bathrooms)` by their kind discriminant.
    pub fn partition_room_aircons(&self) -> (Vec<AirCon>, Vec<AirCon>, Vec<AirCon>) {
        let mut aircons = Vec::new();
        let mut new_aircons = Vec::new();
        let mut bathrooms = Vec::new();
        for room in &self.rooms {
            let Some(idx) = room.air_con else { continue };
            let ac = self.climate[idx].clone();
            if ac.new_air_con {
                new_aircons.push(ac);
            } else if ac.bath_room {
                bathrooms.push(ac);
            } else {
                aircons.push(ac);
            }
        }
        (aircons, new_aircons, bathrooms)
    }

    pub fn set_aircons(&mut self, aircons: Vec<AirCon>) {
        self.aircons = self.upsert_all(aircons);
    }

    pub fn set_new_aircons(&mut self, aircons: Vec<AirCon>) {
        self.new_aircons = self.upsert_all(aircons);
    }

    pub fn set_bathrooms(&mut self, aircons: Vec<AirCon>) {
        self.bathrooms = self.upsert_all(aircons);
    }

    fn upsert_all(&mut self, aircons: Vec<AirCon>) -> Vec<usize> {
        aircons.into_iter().map(|ac| self.upsert(ac)).collect()
    }

    fn upsert(&mut self, ac: AirCon) -> usize {
        let key = ac.key();
        if let Some(&idx) = self.index.get(&key) {
            self.climate[idx] = ac;
            return idx;
        }
        let idx = match self
            .climate
            .iter()
            .position(|existing| existing.key() == key)
        {
            Some(idx) => {
                self.climate[idx] = ac;
                idx
            }
            None => {
                self.climate.push(ac);
                self.climate.len() - 1
            }
        };
        self.index.insert(key, idx);
        idx
    }

    /// Apply an update to a registered unit. Returns the merged unit and the
    /// status fields that changed, or `None` for an unknown unit.
    pub fn update_aircon(
        &mut self,
        key: DeviceKey,
        update: &AirConUpdate,
    ) -> Option<(AirCon, StatusFields)> {
        let Some(&idx) = self.index.get(&key) else {
            debug!("Update for unregistered unit {}", key);
            return None;
        };
        let ac = &mut self.climate[idx];
        let changed = match update {
            AirConUpdate::AirCon(caps) => {
                ac.apply_capabilities(caps);
                StatusFields::empty()
            }
            AirConUpdate::Status(status) => ac.status.merge(status),
        };
        Some((ac.clone(), changed))
    }

    /// Apply a status-query snapshot and count the unit as reported.
    pub fn set_aircon_status(
        &mut self,
        key: DeviceKey,
        status: &AirConStatus,
    ) -> Option<(AirCon, StatusFields)> {
        let result = self.update_aircon(key, &AirConUpdate::Status(status.clone()))?;
        self.reported.insert(key);
        Some(result)
    }

    /// Latch readiness once rooms are loaded and every registered unit has
    /// reported a status snapshot. Returns `true` only on the transition.
    pub fn check_ready(&mut self) -> bool {
        if self.ready || !self.rooms_loaded {
            return false;
        }
        if self.index.keys().all(|key| self.reported.contains(key)) {
            self.ready = true;
            return true;
        }
        false
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn contains(&self, key: &DeviceKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn aircon(&self, key: &DeviceKey) -> Option<&AirCon> {
        self.index.get(key).map(|&idx| &self.climate[idx])
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room(&self, id: u16) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    /// Every registered climate unit: plain aircons first, then new-aircons,
    /// then bathroom units.
    pub fn aircons(&self) -> Vec<AirCon> {
        self.aircons
            .iter()
            .chain(&self.new_aircons)
            .chain(&self.bathrooms)
            .map(|&idx| self.climate[idx].clone())
            .collect()
    }

    /// Registered units of one class.
    pub fn aircons_of(&self, kind: DeviceKind) -> Vec<AirCon> {
        let class = match kind {
            DeviceKind::AirCon => &self.aircons,
            DeviceKind::NewAirCon => &self.new_aircons,
            DeviceKind::Bathroom => &self.bathrooms,
            _ => return Vec::new(),
        };
        class.iter().map(|&idx| self.climate[idx].clone()).collect()
    }

    /// Non-climate devices (geothermic, ventilation, HD, unmodelled).
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, idx: usize) -> Option<&Device> {
        self.devices.get(idx)
    }
}

fn keep_or_replace(field: &mut String, value: String) {
    if !value.is_empty() {
        *field = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{Mode, Switch};
    use crate::protocol::result::UnitRecord;

    fn unit(kind: DeviceKind, unit_id: u8) -> UnitRecord {
        UnitRecord {
            device_id: kind.device_id(),
            kind: Some(kind),
            unit_id,
            name: format!("{}-{}", kind, unit_id),
            alias: String::new(),
        }
    }

    fn room(id: u16, alias: &str, units: Vec<UnitRecord>) -> RoomRecord {
        RoomRecord {
            id,
            name: format!("room{}", id),
            alias: alias.to_string(),
            icon: String::new(),
            units,
        }
    }

    fn loaded() -> Registry {
        let mut reg = Registry::new();
        reg.set_rooms(vec![
            room(1, "Lounge", vec![unit(DeviceKind::AirCon, 0), unit(DeviceKind::Geothermic, 0)]),
            room(2, "", vec![unit(DeviceKind::NewAirCon, 0), unit(DeviceKind::Hd, 0)]),
            room(3, "Bath", vec![unit(DeviceKind::Bathroom, 0)]),
        ]);
        let (a, n, b) = reg.partition_room_aircons();
        reg.set_aircons(a);
        reg.set_new_aircons(n);
        reg.set_bathrooms(b);
        reg
    }

    #[test]
    fn test_set_rooms_builds_arenas() {
        let reg = loaded();
        assert_eq!(reg.rooms().len(), 3);
        let lounge = reg.room(1).unwrap();
        assert!(lounge.air_con.is_some());
        let geo = reg.device(lounge.geothermic.unwrap()).unwrap();
        assert_eq!(geo.kind, Some(DeviceKind::Geothermic));
        assert_eq!(geo.room_id, 1);
        assert!(reg.room(2).unwrap().hd_room);
        assert_eq!(reg.devices().len(), 2);
    }

    #[test]
    fn test_partition_by_discriminant() {
        let reg = loaded();
        assert_eq!(reg.aircons_of(DeviceKind::AirCon).len(), 1);
        assert_eq!(reg.aircons_of(DeviceKind::NewAirCon).len(), 1);
        assert_eq!(reg.aircons_of(DeviceKind::Bathroom).len(), 1);
        assert_eq!(reg.aircons().len(), 3);
        assert!(reg.aircons_of(DeviceKind::AirCon)[0].room_id == 1);
    }

    #[test]
    fn test_room_alias_copied() {
        let reg = loaded();
        let lounge = reg.aircon(&DeviceKey::new(DeviceKind::AirCon, 1, 0)).unwrap();
        assert_eq!(lounge.alias, "Lounge");
        let upstairs = reg.aircon(&DeviceKey::new(DeviceKind::NewAirCon, 2, 0)).unwrap();
        assert_eq!(upstairs.alias, "");
    }

    #[test]
    fn test_one_aircon_per_room() {
        let mut reg = Registry::new();
        reg.set_rooms(vec![room(
            4,
            "",
            vec![unit(DeviceKind::AirCon, 0), unit(DeviceKind::AirCon, 1)],
        )]);
        let (a, _, _) = reg.partition_room_aircons();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].unit_id, 1);
    }

    #[test]
    fn test_repeated_rooms_keep_units() {
        let mut reg = loaded();
        let key = DeviceKey::new(DeviceKind::AirCon, 1, 0);
        let status = AirConStatus {
            switch: Some(Switch::On),
            ..Default::default()
        };
        reg.set_aircon_status(key, &status).unwrap();
        let devices_before = reg.devices().len();

        let mut renamed = room(1, "", vec![unit(DeviceKind::AirCon, 0), unit(DeviceKind::Geothermic, 0)]);
        renamed.name = String::new();
        reg.set_rooms(vec![renamed]);

        assert_eq!(reg.rooms().len(), 3);
        assert_eq!(reg.room(1).unwrap().name, "room1");
        assert_eq!(reg.devices().len(), devices_before);
        let ac = reg.aircon(&key).unwrap();
        assert_eq!(ac.status.switch, Some(Switch::On));
        assert_eq!(ac.alias, "Lounge");
        assert!(reg.reported.contains(&key));
    }

    #[test]
    fn test_ready_survives_repeated_rooms() {
        let mut reg = Registry::new();
        reg.set_rooms(vec![room(1, "", vec![unit(DeviceKind::AirCon, 0)])]);
        let (a, _, _) = reg.partition_room_aircons();
        reg.set_aircons(a);
        let key = DeviceKey::new(DeviceKind::AirCon, 1, 0);
        reg.set_aircon_status(key, &AirConStatus::default()).unwrap();
        assert!(reg.check_ready());

        reg.set_rooms(vec![room(1, "", vec![unit(DeviceKind::AirCon, 0)])]);
        assert!(reg.is_ready());
        assert!(!reg.check_ready());
    }

    #[test]
    fn test_new_unit_takes_over_room_slot() {
        let mut reg = loaded();
        let old = DeviceKey::new(DeviceKind::AirCon, 1, 0);
        reg.set_rooms(vec![room(1, "", vec![unit(DeviceKind::AirCon, 2)])]);
        let (a, _, _) = reg.partition_room_aircons();
        reg.set_aircons(a);

        assert!(!reg.contains(&old));
        let new = DeviceKey::new(DeviceKind::AirCon, 1, 2);
        assert!(reg.contains(&new));
        assert_eq!(reg.aircons_of(DeviceKind::AirCon).len(), 1);
    }

    #[test]
    fn test_status_merge_and_unknown() {
        let mut reg = loaded();
        let key = DeviceKey::new(DeviceKind::AirCon, 1, 0);
        let update = AirConStatus {
            mode: Some(Mode::Cool),
            ..Default::default()
        };
        let (ac, changed) = reg.update_aircon(key, &AirConUpdate::Status(update)).unwrap();
        assert_eq!(changed, StatusFields::MODE);
        assert_eq!(ac.status.mode, Some(Mode::Cool));

        let unknown = DeviceKey::new(DeviceKind::AirCon, 9, 0);
        assert!(reg.update_aircon(unknown, &AirConUpdate::Status(AirConStatus::default())).is_none());
    }

    #[test]
    fn test_capability_update_keeps_status() {
        let mut reg = loaded();
        let key = DeviceKey::new(DeviceKind::AirCon, 1, 0);
        let status = AirConStatus {
            switch: Some(Switch::On),
            ..Default::default()
        };
        reg.set_aircon_status(key, &status).unwrap();

        let mut caps = AirCon::new(DeviceKind::AirCon, 1, 0);
        caps.heat_mode = true;
        let (ac, _) = reg.update_aircon(key, &AirConUpdate::AirCon(caps)).unwrap();
        assert!(ac.heat_mode);
        assert_eq!(ac.status.switch, Some(Switch::On));
        assert_eq!(ac.alias, "Lounge");
    }

    #[test]
    fn test_readiness_requires_every_snapshot() {
        let mut reg = loaded();
        assert!(!reg.check_ready());
        for key in [
            DeviceKey::new(DeviceKind::AirCon, 1, 0),
            DeviceKey::new(DeviceKind::NewAirCon, 2, 0),
        ] {
            reg.set_aircon_status(key, &AirConStatus::default()).unwrap();
            assert!(!reg.check_ready());
        }
        reg.set_aircon_status(DeviceKey::new(DeviceKind::Bathroom, 3, 0), &AirConStatus::default())
            .unwrap();
        assert!(reg.check_ready());
        assert!(reg.is_ready());
        assert!(!reg.check_ready());
    }

    #[test]
    fn test_ready_without_units() {
        let mut reg = Registry::new();
        assert!(!reg.check_ready());
        reg.set_rooms(vec![room(1, "", vec![unit(DeviceKind::Ventilation, 0)])]);
        assert!(reg.check_ready());
    }
}
