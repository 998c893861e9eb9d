// SPDX-License-Identifier: MIT

//! Partition type GUIDs used by the paver, in on-disk byte order.

define_partition_types! {
    EFI => "EFI System Partition",
        [0x28, 0x73, 0x2A, 0xC1, 0x1F, 0xF8, 0xD2, 0x11, 0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E, 0xC9, 0x3B],
    FVM => "Fuchsia Volume Manager",
        [0x40, 0xE3, 0xD0, 0x41, 0xE3, 0x57, 0x4E, 0x95, 0x8C, 0x1E, 0x17, 0xEC, 0xAC, 0x44, 0xCF, 0xF5],
    INSTALL => "Fuchsia Install",
        [0x46, 0x55, 0x43, 0x48, 0x53, 0x49, 0x41, 0x20, 0x49, 0x4E, 0x53, 0x54, 0x41, 0x4C, 0x4C, 0x52],
    SYSTEM => "Fuchsia System",
        [0x0B, 0x00, 0x6B, 0x60, 0xC7, 0xB7, 0x53, 0x46, 0xA7, 0xD5, 0xB7, 0x37, 0x33, 0x2C, 0x89, 0x9D],
    BLOB => "Fuchsia Blob",
        [0x0E, 0x38, 0x67, 0x29, 0x4C, 0x13, 0xBB, 0x4C, 0xB6, 0xDA, 0x17, 0xE7, 0xCE, 0x1C, 0xA4, 0x5D],
    DATA => "Fuchsia Data",
        [0x0C, 0x5F, 0x18, 0x08, 0x2D, 0x89, 0x8A, 0x42, 0xA7, 0x89, 0xDB, 0xEE, 0xC8, 0xF5, 0x5E, 0x6A],
    ZIRCON_A => "Zircon A",
        [0x86, 0xCC, 0x30, 0xDE, 0x4A, 0x1F, 0x31, 0x4A, 0x93, 0xC4, 0x66, 0xF1, 0x47, 0xD3, 0x3E, 0x05],
    ZIRCON_B => "Zircon B",
        [0xDF, 0x04, 0xCC, 0x23, 0x78, 0xC2, 0xE7, 0x4C, 0x84, 0x71, 0x89, 0x7D, 0x1A, 0x4B, 0xCD, 0xF7],
    ZIRCON_R => "Zircon R",
        [0x57, 0xCF, 0xE5, 0xA0, 0xEF, 0x2D, 0xBE, 0x46, 0xA8, 0x0C, 0xA2, 0x06, 0x7C, 0x37, 0xCD, 0x49],
    CROS_KERNEL => "ChromeOS Kernel",
        [0x5D, 0x2A, 0x3A, 0xFE, 0x32, 0x4F, 0xA7, 0x41, 0xB7, 0x25, 0xAC, 0xCC, 0x32, 0x85, 0xA3, 0x09],
    CROS_ROOTFS => "ChromeOS Root",
        [0x02, 0xE2, 0xB8, 0x3C, 0x7E, 0x3B, 0xDD, 0x47, 0x8A, 0x3C, 0x7F, 0xF2, 0xA1, 0x3C, 0xFC, 0xEC],
    BASIC_DATA => "Basic Data",
        [0xA2, 0xA0, 0xD0, 0xEB, 0xE5, 0xB9, 0x33, 0x44, 0x87, 0xC0, 0x68, 0xB6, 0xB7, 0x26, 0x99, 0xC7],
}

/// Formats an on-disk GUID in the canonical textual form.
pub fn format_guid(guid: &[u8; 16]) -> String {
    uuid::Uuid::from_bytes_le(*guid).hyphenated().to_string().to_uppercase()
}

/// Draws a fresh random GUID (UUID v4, OS CSPRNG) in on-disk byte order.
pub fn random_guid() -> [u8; 16] {
    uuid::Uuid::new_v4().to_bytes_le()
}
