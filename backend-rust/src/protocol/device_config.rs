//! Device configuration (0x31) decoding.
//!
//! Each entry names a wagon and its orientation. The wagon's two switches
//! sit at `10.0.{train}.{wagon}` and `10.0.{train}.{wagon + 20}`; connected
//! display clients are grouped by the switch they sit behind.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;

use tracing::debug;
use transit_types::{ConnectedClient, DeviceConfiguration, DeviceEntry, Event};

use crate::channel::ChannelHandle;
use crate::error::DecodeError;

use super::payload::DecodeContext;
use super::reader::FieldReader;

/// Offset between a wagon's left and right switch host octets.
const RIGHT_SWITCH_OFFSET: u32 = 20;

/// Decimal fields of a raw device id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub device_type: u32,
    pub train: u32,
    pub wagon: u32,
}

/// Splits the zero-padded 9-digit decimal form `TTTTNNNWW`. Longer ids keep
/// their extra leading digits in the type and trailing digits in the wagon.
pub fn split_raw_id(raw_id: u32) -> DeviceId {
    let digits = format!("{raw_id:09}");
    let field = |s: &str| s.parse::<u32>().unwrap_or_default();
    DeviceId {
        device_type: field(&digits[..4]),
        train: field(&digits[4..7]),
        wagon: field(&digits[7..]),
    }
}

/// Left and right switch addresses for a wagon, swapped for `direction == 1`.
pub fn switch_pair(train: u32, wagon: u32, direction: u8) -> (String, String) {
    let left = format!("10.0.{train}.{wagon}");
    let right = format!("10.0.{train}.{}", wagon + RIGHT_SWITCH_OFFSET);
    if direction == 1 {
        (right, left)
    } else {
        (left, right)
    }
}

pub(super) fn decode_device_configuration(
    r: &mut FieldReader<'_>,
    ctx: &DecodeContext<'_>,
) -> Result<Event, DecodeError> {
    let count = r.read_byte()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let raw_id = r.read_u32()?;
        let direction = r.read_byte()?;
        let id = split_raw_id(raw_id);
        let (left_switch_ip, right_switch_ip) = switch_pair(id.train, id.wagon, direction);
        entries.push(DeviceEntry {
            raw_id,
            device_type: id.device_type,
            train_number: id.train,
            wagon_number: id.wagon,
            direction,
            left_switch_ip,
            right_switch_ip,
        });
    }

    let mut config = map_devices(&ctx.clients.get_all(), &entries);
    debug!(
        entries = entries.len(),
        switches = config.devices.len(),
        unclassified = config.unclassified.len(),
        "device configuration mapped"
    );
    config.entries = entries;
    Ok(Event::DeviceConfiguration(config))
}

/// Groups connected clients by switch address; clients behind no known
/// switch are unclassified.
fn map_devices(
    clients: &HashMap<SocketAddr, ChannelHandle>,
    entries: &[DeviceEntry],
) -> DeviceConfiguration {
    let switch_ips: HashSet<&str> = entries
        .iter()
        .flat_map(|e| [e.left_switch_ip.as_str(), e.right_switch_ip.as_str()])
        .collect();

    let mut sorted: Vec<_> = clients.iter().collect();
    sorted.sort_by_key(|(addr, _)| **addr);

    let mut config = DeviceConfiguration::default();
    for (addr, handle) in sorted {
        let client = ConnectedClient {
            ip: addr.ip().to_string(),
            port: addr.port(),
            channel: handle.id().to_string(),
        };
        if switch_ips.contains(client.ip.as_str()) {
            config
                .devices
                .entry(client.ip.clone())
                .or_insert_with(BTreeMap::new)
                .insert(client.port, client);
        } else {
            config.unclassified.push(client);
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClientRegistry;
    use crate::route_store::RouteStore;
    use transit_types::encode::encode_device_configuration;
    use transit_types::DeviceRecord;

    #[test]
    fn raw_id_split() {
        assert_eq!(
            split_raw_id(123_004_005),
            DeviceId { device_type: 1230, train: 40, wagon: 5 }
        );
        // zero padding
        assert_eq!(split_raw_id(7_001), DeviceId { device_type: 0, train: 70, wagon: 1 });
    }

    #[test]
    fn switch_pairs() {
        assert_eq!(
            switch_pair(40, 5, 0),
            ("10.0.40.5".to_string(), "10.0.40.25".to_string())
        );
        assert_eq!(
            switch_pair(40, 5, 1),
            ("10.0.40.25".to_string(), "10.0.40.5".to_string())
        );
    }

    #[test]
    fn clients_grouped_by_switch() {
        let route = RouteStore::default();
        let clients = ClientRegistry::new();
        let (a, _ra) = ChannelHandle::open();
        let (b, _rb) = ChannelHandle::open();
        let (c, _rc) = ChannelHandle::open();
        clients.register("10.0.40.5:50001".parse().unwrap(), a.clone());
        clients.register("10.0.40.25:50002".parse().unwrap(), b);
        clients.register("192.168.1.7:40000".parse().unwrap(), c);
        let ctx = DecodeContext { route: &route, clients: &clients };

        let payload =
            encode_device_configuration(&[DeviceRecord { raw_id: 123_004_005, direction: 0 }])
                .unwrap();
        let Event::DeviceConfiguration(config) =
            decode_device_configuration(&mut FieldReader::new(&payload[1..]), &ctx).unwrap()
        else {
            panic!("expected device configuration");
        };

        assert_eq!(config.entries.len(), 1);
        let entry = &config.entries[0];
        assert_eq!(entry.device_type, 1230);
        assert_eq!(entry.train_number, 40);
        assert_eq!(entry.wagon_number, 5);
        assert_eq!(entry.left_switch_ip, "10.0.40.5");
        assert_eq!(entry.right_switch_ip, "10.0.40.25");

        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices["10.0.40.5"][&50001].channel, a.id().to_string());
        assert!(config.devices["10.0.40.25"].contains_key(&50002));
        assert_eq!(config.unclassified.len(), 1);
        assert_eq!(config.unclassified[0].ip, "192.168.1.7");
        // decoding never touches the registry
        assert_eq!(clients.len(), 3);
    }

    #[test]
    fn no_clients_no_devices() {
        let route = RouteStore::default();
        let clients = ClientRegistry::new();
        let ctx = DecodeContext { route: &route, clients: &clients };
        let payload = encode_device_configuration(&[
            DeviceRecord { raw_id: 123_004_005, direction: 1 },
            DeviceRecord { raw_id: 123_004_006, direction: 0 },
        ])
        .unwrap();
        let Event::DeviceConfiguration(config) =
            decode_device_configuration(&mut FieldReader::new(&payload[1..]), &ctx).unwrap()
        else {
            panic!("expected device configuration");
        };
        assert_eq!(config.entries[0].left_switch_ip, "10.0.40.25");
        assert_eq!(config.entries[1].wagon_number, 6);
        assert!(config.devices.is_empty());
        assert!(config.unclassified.is_empty());
    }
}
