//! Supported boards and their MCU parameters

use core::str::FromStr;

use crate::PreconditionError;

#[derive(Clone, Debug, PartialEq)]
pub struct DeviceProfile {
    /// Catalog key, as given on the command line
    pub name: &'static str,
    pub mcu_name: &'static str,
    /// MCU signature bytes checked by the bootloader
    pub signature: [u8; 3],
    /// Flash page size in bytes
    pub page_size: usize,
}

pub const DEFAULT_DEVICE: &str = "sensorimotor_rev1.1";

pub const DEVICES: &[DeviceProfile] = &[
    DeviceProfile {
        name: "sensorimotor_rev1.1",
        mcu_name: "atmega328p",
        signature: [0x1E, 0x95, 0x0F],
        page_size: 128,
    },
    DeviceProfile {
        name: "sensorimotor_rev1.2",
        mcu_name: "atmega328pb",
        signature: [0x1E, 0x95, 0x16],
        page_size: 128,
    },
];

/// Names of all supported devices
pub fn supported() -> Vec<&'static str> {
    DEVICES.iter().map(|d| d.name).collect()
}

impl DeviceProfile {
    pub fn find(name: &str) -> Option<&'static DeviceProfile> {
        DEVICES.iter().find(|d| d.name == name)
    }
}

impl FromStr for DeviceProfile {
    type Err = PreconditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceProfile::find(s)
            .cloned()
            .ok_or_else(|| PreconditionError::UnknownDevice(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        let d: DeviceProfile = "sensorimotor_rev1.2".parse().unwrap();
        assert_eq!(d.mcu_name, "atmega328pb");
        assert_eq!(d.signature, [0x1E, 0x95, 0x16]);

        assert!(DeviceProfile::find(DEFAULT_DEVICE).is_some());
    }

    #[test]
    fn unknown_device_lists_supported() {
        let e = "sensorimotor_rev9".parse::<DeviceProfile>().unwrap_err();
        assert_eq!(e, PreconditionError::UnknownDevice("sensorimotor_rev9".into()));

        let msg = e.to_string();
        assert!(msg.contains("sensorimotor_rev1.1"));
        assert!(msg.contains("sensorimotor_rev1.2"));
    }

    #[test]
    fn page_sizes_are_powers_of_two() {
        assert!(DEVICES.iter().all(|d| d.page_size.is_power_of_two()));
    }
}
