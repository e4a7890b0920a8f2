//! Firmware images for the CPU card.
//!
//! The two CPU card variants are the same board with different EPROM sets,
//! so a variant is just a [`FirmwareImage`] describing which 2708 goes in
//! which socket.

use std::{fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, memory::ROM_SIZE, signal::FILL_VALUE};

const EPROM_2708_SIZE: u16 = 0x400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomChunk {
    pub file: String,
    pub offset: u16,
    pub len: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareImage {
    pub name: String,
    pub chunks: Vec<RomChunk>,
}

impl FirmwareImage {
    /// XMON/D rev.5, shipped with the TDV-2114.
    pub fn xmon_d_rev5() -> Self {
        Self::from_2708_set(
            "XMON/D rev.5",
            &[
                "eprom.2708.u1",
                "eprom.2708.u2",
                "eprom.2708.u3",
                "eprom.2708.u4",
                "eprom.2708.u5",
                "eprom.2708.u6",
            ],
        )
    }

    /// XMON/F rev.3, shipped with the TDV-2124.
    pub fn xmon_f_rev3() -> Self {
        Self::from_2708_set(
            "XMON/F rev.3",
            &[
                "961045-3 1.2708.u1",
                "961045-3 2.2708.u2",
                "961045-3 3.2708.u3",
                "961045-3 4.2708.u4",
                "961045-3 5.2708.u5",
            ],
        )
    }

    fn from_2708_set(name: &str, files: &[&str]) -> Self {
        let chunks = files
            .iter()
            .enumerate()
            .map(|(socket, file)| RomChunk {
                file: file.to_string(),
                offset: socket as u16 * EPROM_2708_SIZE,
                len: EPROM_2708_SIZE,
            })
            .collect();

        Self {
            name: name.to_string(),
            chunks,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for chunk in &self.chunks {
            if chunk.offset as usize + chunk.len as usize > ROM_SIZE {
                return Err(ConfigError::Firmware(format!(
                    "{} at {:#06X} runs past the {:#06X} byte ROM region",
                    chunk.file, chunk.offset, ROM_SIZE
                )));
            }
        }
        Ok(())
    }

    /// An erased ROM region, as seen with empty sockets.
    pub fn blank(&self) -> Vec<u8> {
        vec![FILL_VALUE; ROM_SIZE]
    }

    /// Lays out one dump per socket, in socket order. Short dumps leave the
    /// rest of their socket erased.
    pub fn assemble(&self, dumps: &[&[u8]]) -> Result<Vec<u8>, ConfigError> {
        self.validate()?;
        if dumps.len() != self.chunks.len() {
            return Err(ConfigError::Firmware(format!(
                "{} needs {} EPROM dumps, got {}",
                self.name,
                self.chunks.len(),
                dumps.len()
            )));
        }

        let mut region = self.blank();
        for (chunk, dump) in self.chunks.iter().zip(dumps) {
            if dump.len() > chunk.len as usize {
                return Err(ConfigError::Firmware(format!(
                    "{} is {} bytes, socket holds {}",
                    chunk.file,
                    dump.len(),
                    chunk.len
                )));
            }
            let start = chunk.offset as usize;
            region[start..start + dump.len()].copy_from_slice(dump);
        }
        Ok(region)
    }

    pub fn load(&self, dir: impl AsRef<Path>) -> anyhow::Result<Vec<u8>> {
        let dir = dir.as_ref();
        let mut dumps = Vec::with_capacity(self.chunks.len());
        for chunk in &self.chunks {
            let path = dir.join(&chunk.file);
            let data = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            dumps.push(data);
        }

        let dumps: Vec<&[u8]> = dumps.iter().map(Vec::as_slice).collect();
        let region = self.assemble(&dumps)?;
        tracing::info!("[ROM] Loaded {} from {}", self.name, dir.display());
        Ok(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts() {
        let xmon_d = FirmwareImage::xmon_d_rev5();
        assert_eq!(xmon_d.chunks.len(), 6);
        assert_eq!(xmon_d.chunks[5].offset, 0x1400);
        assert!(xmon_d.validate().is_ok());

        let xmon_f = FirmwareImage::xmon_f_rev3();
        assert_eq!(xmon_f.chunks.len(), 5);
        assert_eq!(xmon_f.chunks[4].offset, 0x1000);
    }

    #[test]
    fn test_assemble_places_sockets() {
        let image = FirmwareImage::xmon_f_rev3();
        let u1 = vec![0x11; 0x400];
        let u2 = vec![0x22; 0x10];
        let empty: &[u8] = &[];
        let region = image
            .assemble(&[&u1, &u2, empty, empty, &[0x55]])
            .unwrap();

        assert_eq!(region.len(), ROM_SIZE);
        assert_eq!(region[0x03FF], 0x11);
        assert_eq!(region[0x0400], 0x22);
        assert_eq!(region[0x0410], FILL_VALUE);
        assert_eq!(region[0x1000], 0x55);
        assert_eq!(region[0x1400], FILL_VALUE);
    }

    #[test]
    fn test_assemble_rejects_bad_dumps() {
        let image = FirmwareImage::xmon_f_rev3();
        assert!(image.assemble(&[&[0u8; 4]]).is_err());

        let oversized = vec![0; 0x401];
        let empty: &[u8] = &[];
        assert!(image
            .assemble(&[&oversized, empty, empty, empty, empty])
            .is_err());
    }

    #[test]
    fn test_validate_region_bounds() {
        let mut image = FirmwareImage::xmon_d_rev5();
        image.chunks.push(RomChunk {
            file: "extra".into(),
            offset: 0x1C00,
            len: 0x800,
        });
        assert!(matches!(image.validate(), Err(ConfigError::Firmware(_))));
    }

    #[test]
    fn test_load_missing_directory() {
        let image = FirmwareImage::xmon_d_rev5();
        assert!(image.load("/nonexistent/tdv2100/roms").is_err());
    }
}
