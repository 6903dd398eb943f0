use mic_capture_core::TransportType;

/// Classify an endpoint by its PnP enumerator name
/// (`PKEY_Device_EnumeratorName`), e.g. "USB" or "BTHENUM".
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
pub(crate) fn transport_from_enumerator_name(name: &str) -> TransportType {
    let name = name.to_ascii_uppercase();
    if name.contains("BTHLEENUM") {
        TransportType::BluetoothLE
    } else if name.contains("BTHENUM") {
        TransportType::Bluetooth
    } else if name.contains("USB") {
        TransportType::Usb
    } else if name.contains("ROOT") || name.contains("SWD") {
        TransportType::Virtual
    } else if name.contains("HDAUDIO") || name.contains("INTELAUDIO") {
        TransportType::BuiltIn
    } else {
        TransportType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_enumerators() {
        assert_eq!(transport_from_enumerator_name("USB"), TransportType::Usb);
        assert_eq!(transport_from_enumerator_name("BTHENUM"), TransportType::Bluetooth);
        assert_eq!(transport_from_enumerator_name("BTHLEEnum"), TransportType::BluetoothLE);
        assert_eq!(transport_from_enumerator_name("HDAUDIO"), TransportType::BuiltIn);
        assert_eq!(transport_from_enumerator_name("ROOT"), TransportType::Virtual);
    }

    #[test]
    fn unrecognized_is_unknown() {
        assert_eq!(transport_from_enumerator_name(""), TransportType::Unknown);
        assert_eq!(transport_from_enumerator_name("ACPI"), TransportType::Unknown);
    }
}
