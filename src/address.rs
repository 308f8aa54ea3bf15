use crate::{Error, bus::ObjectPath};
use core::fmt::Write;

const HEX_DIGITS: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F',
];

/// A Bluetooth Device Address (`BD_ADDR`) identifying the remote end of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BluetoothAddress(pub [u8; 6]);

impl BluetoothAddress {
    /// Create a new Bluetooth address from bytes
    #[must_use]
    pub const fn new(addr: [u8; 6]) -> Self {
        Self(addr)
    }

    /// Get the raw address bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Format the address as a colon-separated hex string
    #[must_use]
    pub fn format_hex(&self) -> heapless::String<17> {
        self.join(':')
    }

    /// Object path component for this device, e.g. `dev_12_34_56_78_9A_BC`
    #[must_use]
    pub fn path_component(&self) -> heapless::String<21> {
        let mut result = heapless::String::new();
        result.push_str("dev_").ok();
        result.push_str(&self.join::<17>('_')).ok();
        result
    }

    /// Object path of this device below an adapter path such as `/org/bluez/hci0`
    ///
    /// # Errors
    /// Returns `Error::InvalidArguments` if the resulting path does not fit.
    pub fn device_path(&self, adapter_path: &str) -> Result<ObjectPath, Error> {
        let mut path = ObjectPath::new();
        write!(path, "{}/{}", adapter_path, self.path_component())
            .map_err(|_| Error::InvalidArguments)?;
        Ok(path)
    }

    /// Parse a Bluetooth address from a colon-separated hex string
    ///
    /// # Errors
    /// Returns `Error::InvalidArguments` if the string is not exactly 17 characters long
    /// or contains invalid characters
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        if hex.len() != 17 || !hex.chars().all(|c| c.is_ascii_hexdigit() || c == ':') {
            return Err(Error::InvalidArguments);
        }

        let mut bytes = [0u8; 6];
        for (i, byte) in hex.split(':').enumerate() {
            if i >= 6 || byte.len() != 2 {
                return Err(Error::InvalidArguments);
            }
            bytes[i] = u8::from_str_radix(byte, 16).map_err(|_| Error::InvalidArguments)?;
        }
        Ok(Self(bytes))
    }

    fn join<const N: usize>(&self, separator: char) -> heapless::String<N> {
        let mut result = heapless::String::new();
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                result.push(separator).ok();
            }
            result.push(HEX_DIGITS[(byte >> 4) as usize]).ok();
            result.push(HEX_DIGITS[(byte & 0x0F) as usize]).ok();
        }
        result
    }
}

impl From<[u8; 6]> for BluetoothAddress {
    fn from(addr: [u8; 6]) -> Self {
        Self(addr)
    }
}

impl From<BluetoothAddress> for bt_hci::param::BdAddr {
    fn from(addr: BluetoothAddress) -> Self {
        bt_hci::param::BdAddr::new(addr.0)
    }
}

impl TryFrom<bt_hci::param::BdAddr> for BluetoothAddress {
    type Error = Error;

    fn try_from(bd_addr: bt_hci::param::BdAddr) -> Result<Self, Self::Error> {
        let bytes: [u8; 6] = bd_addr
            .raw()
            .try_into()
            .map_err(|_| Error::InvalidArguments)?;
        Ok(Self(bytes))
    }
}

impl TryFrom<&str> for BluetoothAddress {
    type Error = Error;

    fn try_from(hex: &str) -> Result<Self, Self::Error> {
        BluetoothAddress::from_hex(hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bluetooth_address_format_hex() {
        let addr = BluetoothAddress::new([0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
        assert_eq!(addr.format_hex().as_str(), "12:34:56:78:9A:BC");

        let addr_mixed = BluetoothAddress::new([0x0A, 0xB1, 0x2C, 0xD3, 0x4E, 0xF5]);
        assert_eq!(addr_mixed.format_hex().as_str(), "0A:B1:2C:D3:4E:F5");
    }

    #[test]
    fn test_bluetooth_address_paths() {
        let addr = BluetoothAddress::new([0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
        assert_eq!(addr.path_component().as_str(), "dev_12_34_56_78_9A_BC");
        assert_eq!(
            addr.device_path("/org/bluez/hci0").unwrap().as_str(),
            "/org/bluez/hci0/dev_12_34_56_78_9A_BC"
        );
    }

    #[test]
    fn test_bluetooth_address_from_hex() {
        let addr: BluetoothAddress = "12:34:56:78:9A:BC".try_into().unwrap();
        assert_eq!(addr.as_bytes(), &[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);

        assert_eq!(
            BluetoothAddress::from_hex("12:34:56:78:9A"),
            Err(Error::InvalidArguments)
        );
        assert_eq!(
            BluetoothAddress::from_hex("12:34:56:78:9A:ZZ"),
            Err(Error::InvalidArguments)
        );
    }

    #[test]
    fn test_bluetooth_address_bd_addr_conversion() {
        let bytes = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];
        let bd_addr: bt_hci::param::BdAddr = BluetoothAddress::new(bytes).into();
        assert_eq!(bd_addr.raw(), bytes);

        let back = BluetoothAddress::try_from(bd_addr).unwrap();
        assert_eq!(back.as_bytes(), &bytes);
    }
}
