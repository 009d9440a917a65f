//! Test-only support: a byte-level reader for written MMV files, plus
//! helpers for running clients against a temporary directory.
//!
//! The production crate only ever writes MMV files; parsing them back is the
//! consumer's job. This reader exists so the tests can check the written
//! image field by field against the format.

#![allow(dead_code, reason = "each integration test binary uses a subset")]

use std::collections::HashMap;

use mmv::{Client, Config, FileFlags};

pub const HEADER_LENGTH: usize = 40;
pub const TOC_LENGTH: usize = 16;
pub const INDOM_LENGTH: usize = 32;
pub const VALUE_LENGTH: usize = 32;
pub const STRING_LENGTH: usize = 256;

pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

pub fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

pub fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

pub fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    f64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

fn read_inline_name(bytes: &[u8], offset: usize) -> String {
    let field = &bytes[offset..offset + 64];
    let end = field.iter().position(|b| *b == 0).unwrap_or(64);
    String::from_utf8(field[..end].to_vec()).unwrap()
}

#[derive(Debug)]
pub struct Header {
    pub magic: [u8; 4],
    pub version: i32,
    pub g1: u64,
    pub g2: u64,
    pub toc: i32,
    pub flags: i32,
    pub pid: i32,
    pub cluster: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toc {
    pub kind: i32,
    pub count: i32,
    pub offset: u64,
}

#[derive(Debug)]
pub struct IndomRecord {
    pub serial: u32,
    pub count: u32,
    pub instance_offset: u64,
    pub short_text: u64,
    pub long_text: u64,
}

#[derive(Debug)]
pub struct InstanceRecord {
    pub indom_offset: u64,
    pub internal_id: u32,
    pub name: String,
}

#[derive(Debug)]
pub struct MetricRecord {
    pub name: String,
    pub item: u32,
    pub typ: i32,
    pub sem: i32,
    pub unit: u32,
    pub indom: i32,
    pub short_text: u64,
    pub long_text: u64,
}

#[derive(Debug)]
pub struct ValueRecord {
    /// Raw first eight payload bytes.
    pub val: u64,
    /// Raw second eight payload bytes; the string-cell offset for string
    /// values.
    pub extra: i64,
    pub metric_offset: u64,
    pub instance_offset: u64,
}

/// A fully decoded file image.
#[derive(Debug)]
pub struct Dump {
    pub header: Header,
    pub tocs: Vec<Toc>,
    pub indoms: HashMap<u64, IndomRecord>,
    pub instances: HashMap<u64, InstanceRecord>,
    pub metrics: HashMap<u64, MetricRecord>,
    pub values: Vec<ValueRecord>,
    pub strings: HashMap<u64, Vec<u8>>,
}

impl Dump {
    pub fn parse(bytes: &[u8]) -> Dump {
        assert!(bytes.len() >= HEADER_LENGTH, "file too small for a header");

        let header = Header {
            magic: bytes[0..4].try_into().unwrap(),
            version: read_i32(bytes, 4),
            g1: read_u64(bytes, 8),
            g2: read_u64(bytes, 16),
            toc: read_i32(bytes, 24),
            flags: read_i32(bytes, 28),
            pid: read_i32(bytes, 32),
            cluster: read_i32(bytes, 36),
        };

        assert_eq!(&header.magic, b"MMV\0", "bad magic");

        let mut tocs = Vec::new();
        for i in 0..header.toc as usize {
            let offset = HEADER_LENGTH + i * TOC_LENGTH;
            tocs.push(Toc {
                kind: read_i32(bytes, offset),
                count: read_i32(bytes, offset + 4),
                offset: read_u64(bytes, offset + 8),
            });
        }

        let version = header.version;
        let instance_length = if version == 2 { 24 } else { 80 };
        let metric_length = if version == 2 { 48 } else { 104 };

        let mut dump = Dump {
            header,
            tocs,
            indoms: HashMap::new(),
            instances: HashMap::new(),
            metrics: HashMap::new(),
            values: Vec::new(),
            strings: HashMap::new(),
        };

        // Strings first so the v2 name lookups below can resolve.
        for toc in &dump.tocs {
            if toc.kind == 5 {
                for i in 0..toc.count as usize {
                    let offset = toc.offset as usize + i * STRING_LENGTH;
                    dump.strings
                        .insert(offset as u64, bytes[offset..offset + STRING_LENGTH].to_vec());
                }
            }
        }

        let tocs = dump.tocs.clone();
        for toc in &tocs {
            match toc.kind {
                1 => {
                    for i in 0..toc.count as usize {
                        let offset = toc.offset as usize + i * INDOM_LENGTH;
                        dump.indoms.insert(
                            offset as u64,
                            IndomRecord {
                                serial: read_u32(bytes, offset),
                                count: read_u32(bytes, offset + 4),
                                instance_offset: read_u64(bytes, offset + 8),
                                short_text: read_u64(bytes, offset + 16),
                                long_text: read_u64(bytes, offset + 24),
                            },
                        );
                    }
                }
                2 => {
                    for i in 0..toc.count as usize {
                        let offset = toc.offset as usize + i * instance_length;
                        let name = if version == 2 {
                            dump.string_at(read_u64(bytes, offset + 16))
                        } else {
                            read_inline_name(bytes, offset + 16)
                        };

                        dump.instances.insert(
                            offset as u64,
                            InstanceRecord {
                                indom_offset: read_u64(bytes, offset),
                                internal_id: read_u32(bytes, offset + 12),
                                name,
                            },
                        );
                    }
                }
                3 => {
                    for i in 0..toc.count as usize {
                        let offset = toc.offset as usize + i * metric_length;
                        let (name, fields) = if version == 2 {
                            (dump.string_at(read_u64(bytes, offset)), offset + 8)
                        } else {
                            (read_inline_name(bytes, offset), offset + 64)
                        };

                        dump.metrics.insert(
                            offset as u64,
                            MetricRecord {
                                name,
                                item: read_u32(bytes, fields),
                                typ: read_i32(bytes, fields + 4),
                                sem: read_i32(bytes, fields + 8),
                                unit: read_u32(bytes, fields + 12),
                                indom: read_i32(bytes, fields + 16),
                                short_text: read_u64(bytes, fields + 24),
                                long_text: read_u64(bytes, fields + 32),
                            },
                        );
                    }
                }
                4 => {
                    for i in 0..toc.count as usize {
                        let offset = toc.offset as usize + i * VALUE_LENGTH;
                        dump.values.push(ValueRecord {
                            val: read_u64(bytes, offset),
                            extra: read_i64(bytes, offset + 8),
                            metric_offset: read_u64(bytes, offset + 16),
                            instance_offset: read_u64(bytes, offset + 24),
                        });
                    }
                }
                _ => {}
            }
        }

        dump
    }

    /// The NUL-terminated string in the pool cell at `offset`.
    pub fn string_at(&self, offset: u64) -> String {
        let cell = self
            .strings
            .get(&offset)
            .unwrap_or_else(|| panic!("no string cell at offset {offset}"));
        let end = cell.iter().position(|b| *b == 0).unwrap_or(cell.len());
        String::from_utf8(cell[..end].to_vec()).unwrap()
    }

    /// The metric record with this full name, plus its offset.
    pub fn find_metric(&self, name: &str) -> (u64, &MetricRecord) {
        self.metrics
            .iter()
            .find(|(_, m)| m.name == name)
            .map(|(offset, m)| (*offset, m))
            .unwrap_or_else(|| panic!("no metric named {name}"))
    }

    /// All value slots pointing back at the metric record at
    /// `metric_offset`.
    pub fn values_of(&self, metric_offset: u64) -> Vec<&ValueRecord> {
        self.values
            .iter()
            .filter(|v| v.metric_offset == metric_offset)
            .collect()
    }

    /// The value slot of one instance of a metric.
    pub fn value_of_instance(&self, metric_offset: u64, instance: &str) -> &ValueRecord {
        self.values
            .iter()
            .find(|v| {
                v.metric_offset == metric_offset
                    && v.instance_offset != 0
                    && self.instances[&v.instance_offset].name == instance
            })
            .unwrap_or_else(|| panic!("no value for instance {instance}"))
    }

    /// The TOC entry of the given kind, if present.
    pub fn toc(&self, kind: i32) -> Option<&Toc> {
        self.tocs.iter().find(|t| t.kind == kind)
    }
}

/// A client whose file lives in its own temporary directory.
///
/// Keep the returned `TempDir` alive for the duration of the test.
pub fn test_client(name: &str) -> (tempfile::TempDir, Client) {
    let dir = tempfile::tempdir().unwrap();
    let client = Client::with_config(name, FileFlags::PROCESS, &test_config(&dir)).unwrap();
    (dir, client)
}

/// A configuration that maps files under `dir`.
pub fn test_config(dir: &tempfile::TempDir) -> Config {
    Config::empty()
        .with_root("/")
        .with_value("PCP_TMP_DIR", dir.path().to_str().unwrap())
}

/// Reads the client's file image back from disk.
pub fn read_image(client: &Client) -> Vec<u8> {
    std::fs::read(client.location()).unwrap()
}
