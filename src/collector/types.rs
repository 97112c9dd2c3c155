use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Narrow an unsigned source counter into the signed wire type.
///
/// Time-series stores commonly reject unsigned integers, so every counter is
/// carried as `i64`. Values past `i64::MAX` saturate rather than wrap.
pub fn narrow(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldsError {
    #[error("unknown field key {0:?}")]
    UnknownKey(String),
    #[error("field {key} expects an integer value")]
    KindMismatch { key: &'static str },
    #[error("missing field key {0}")]
    MissingKey(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
}

/// Snapshot of the most recently collected runtime statistics.
///
/// Keys follow the `cpu.*` / `mem.*` naming used by the flat map and the
/// serialized form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Fields {
    // CPU
    #[serde(rename = "cpu.goroutines")]
    pub num_tasks: i64,
    #[serde(rename = "cpu.cgo_calls")]
    pub num_foreign_calls: i64,

    // General
    #[serde(rename = "mem.alloc")]
    pub alloc: i64,
    #[serde(rename = "mem.total")]
    pub total_alloc: i64,
    #[serde(rename = "mem.sys")]
    pub sys: i64,
    #[serde(rename = "mem.lookups")]
    pub lookups: i64,
    #[serde(rename = "mem.malloc")]
    pub mallocs: i64,
    #[serde(rename = "mem.frees")]
    pub frees: i64,

    // Heap
    #[serde(rename = "mem.heap.alloc")]
    pub heap_alloc: i64,
    #[serde(rename = "mem.heap.sys")]
    pub heap_sys: i64,
    #[serde(rename = "mem.heap.idle")]
    pub heap_idle: i64,
    #[serde(rename = "mem.heap.inuse")]
    pub heap_inuse: i64,
    #[serde(rename = "mem.heap.released")]
    pub heap_released: i64,
    #[serde(rename = "mem.heap.objects")]
    pub heap_objects: i64,

    // Stack
    #[serde(rename = "mem.stack.inuse")]
    pub stack_inuse: i64,
    #[serde(rename = "mem.stack.sys")]
    pub stack_sys: i64,
    #[serde(rename = "mem.stack.mspan_inuse")]
    pub mspan_inuse: i64,
    #[serde(rename = "mem.stack.mspan_sys")]
    pub mspan_sys: i64,
    #[serde(rename = "mem.stack.mcache_inuse")]
    pub mcache_inuse: i64,
    #[serde(rename = "mem.stack.mcache_sys")]
    pub mcache_sys: i64,

    #[serde(rename = "mem.othersys")]
    pub other_sys: i64,

    // GC
    #[serde(rename = "mem.gc.sys")]
    pub gc_sys: i64,
    #[serde(rename = "mem.gc.next")]
    pub next_gc: i64,
    #[serde(rename = "mem.gc.last")]
    pub last_gc: i64,
    #[serde(rename = "mem.gc.pause_total")]
    pub pause_total_ns: i64,
    #[serde(rename = "mem.gc.pause")]
    pub pause_ns: i64,
    #[serde(rename = "mem.gc.count")]
    pub num_gc: i64,
    #[serde(rename = "mem.gc.cpu_fraction")]
    pub gc_cpu_fraction: f64,
}

enum Slot<'a> {
    Int(&'a mut i64),
    Float(&'a mut f64),
}

impl Fields {
    pub const KEYS: [&'static str; 28] = [
        "cpu.goroutines",
        "cpu.cgo_calls",
        "mem.alloc",
        "mem.total",
        "mem.sys",
        "mem.lookups",
        "mem.malloc",
        "mem.frees",
        "mem.heap.alloc",
        "mem.heap.sys",
        "mem.heap.idle",
        "mem.heap.inuse",
        "mem.heap.released",
        "mem.heap.objects",
        "mem.stack.inuse",
        "mem.stack.sys",
        "mem.stack.mspan_inuse",
        "mem.stack.mspan_sys",
        "mem.stack.mcache_inuse",
        "mem.stack.mcache_sys",
        "mem.othersys",
        "mem.gc.sys",
        "mem.gc.next",
        "mem.gc.last",
        "mem.gc.pause_total",
        "mem.gc.pause",
        "mem.gc.count",
        "mem.gc.cpu_fraction",
    ];

    pub fn get(&self, key: &str) -> Option<FieldValue> {
        let value = match key {
            "cpu.goroutines" => self.num_tasks,
            "cpu.cgo_calls" => self.num_foreign_calls,

            "mem.alloc" => self.alloc,
            "mem.total" => self.total_alloc,
            "mem.sys" => self.sys,
            "mem.lookups" => self.lookups,
            "mem.malloc" => self.mallocs,
            "mem.frees" => self.frees,

            "mem.heap.alloc" => self.heap_alloc,
            "mem.heap.sys" => self.heap_sys,
            "mem.heap.idle" => self.heap_idle,
            "mem.heap.inuse" => self.heap_inuse,
            "mem.heap.released" => self.heap_released,
            "mem.heap.objects" => self.heap_objects,

            "mem.stack.inuse" => self.stack_inuse,
            "mem.stack.sys" => self.stack_sys,
            "mem.stack.mspan_inuse" => self.mspan_inuse,
            "mem.stack.mspan_sys" => self.mspan_sys,
            "mem.stack.mcache_inuse" => self.mcache_inuse,
            "mem.stack.mcache_sys" => self.mcache_sys,
            "mem.othersys" => self.other_sys,

            "mem.gc.sys" => self.gc_sys,
            "mem.gc.next" => self.next_gc,
            "mem.gc.last" => self.last_gc,
            "mem.gc.pause_total" => self.pause_total_ns,
            "mem.gc.pause" => self.pause_ns,
            "mem.gc.count" => self.num_gc,
            "mem.gc.cpu_fraction" => return Some(FieldValue::Float(self.gc_cpu_fraction)),
            _ => return None,
        };
        Some(FieldValue::Int(value))
    }

    fn slot(&mut self, key: &str) -> Option<Slot<'_>> {
        let slot = match key {
            "cpu.goroutines" => &mut self.num_tasks,
            "cpu.cgo_calls" => &mut self.num_foreign_calls,

            "mem.alloc" => &mut self.alloc,
            "mem.total" => &mut self.total_alloc,
            "mem.sys" => &mut self.sys,
            "mem.lookups" => &mut self.lookups,
            "mem.malloc" => &mut self.mallocs,
            "mem.frees" => &mut self.frees,

            "mem.heap.alloc" => &mut self.heap_alloc,
            "mem.heap.sys" => &mut self.heap_sys,
            "mem.heap.idle" => &mut self.heap_idle,
            "mem.heap.inuse" => &mut self.heap_inuse,
            "mem.heap.released" => &mut self.heap_released,
            "mem.heap.objects" => &mut self.heap_objects,

            "mem.stack.inuse" => &mut self.stack_inuse,
            "mem.stack.sys" => &mut self.stack_sys,
            "mem.stack.mspan_inuse" => &mut self.mspan_inuse,
            "mem.stack.mspan_sys" => &mut self.mspan_sys,
            "mem.stack.mcache_inuse" => &mut self.mcache_inuse,
            "mem.stack.mcache_sys" => &mut self.mcache_sys,
            "mem.othersys" => &mut self.other_sys,

            "mem.gc.sys" => &mut self.gc_sys,
            "mem.gc.next" => &mut self.next_gc,
            "mem.gc.last" => &mut self.last_gc,
            "mem.gc.pause_total" => &mut self.pause_total_ns,
            "mem.gc.pause" => &mut self.pause_ns,
            "mem.gc.count" => &mut self.num_gc,
            "mem.gc.cpu_fraction" => return Some(Slot::Float(&mut self.gc_cpu_fraction)),
            _ => return None,
        };
        Some(Slot::Int(slot))
    }

    /// Flat key/value view, e.g. for building a time-series point.
    pub fn to_map(&self) -> BTreeMap<&'static str, FieldValue> {
        Self::KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect()
    }

    /// Rebuild a snapshot from its flat form. Every key must be present.
    /// Integer values are accepted for the float field; float values for
    /// integer fields are rejected.
    pub fn from_map<I, K>(entries: I) -> Result<Fields, FieldsError>
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: AsRef<str>,
    {
        let mut fields = Fields::default();
        let mut seen = [false; Fields::KEYS.len()];

        for (key, value) in entries {
            let key = key.as_ref();
            let index = Self::KEYS
                .iter()
                .position(|known| *known == key)
                .ok_or_else(|| FieldsError::UnknownKey(key.to_string()))?;
            let slot = fields
                .slot(key)
                .ok_or_else(|| FieldsError::UnknownKey(key.to_string()))?;
            match (slot, value) {
                (Slot::Int(target), FieldValue::Int(v)) => *target = v,
                (Slot::Float(target), FieldValue::Float(v)) => *target = v,
                (Slot::Float(target), FieldValue::Int(v)) => *target = v as f64,
                (Slot::Int(_), FieldValue::Float(_)) => {
                    return Err(FieldsError::KindMismatch {
                        key: Self::KEYS[index],
                    })
                }
            }
            seen[index] = true;
        }

        if let Some(index) = seen.iter().position(|present| !present) {
            return Err(FieldsError::MissingKey(Self::KEYS[index]));
        }
        Ok(fields)
    }

    /// Time of the last garbage collection, `None` if none has happened.
    pub fn last_gc_time(&self) -> Option<DateTime<Utc>> {
        if self.last_gc <= 0 {
            return None;
        }
        Some(Utc.timestamp_nanos(self.last_gc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> Fields {
        Fields {
            num_tasks: 12,
            num_foreign_calls: 3,
            alloc: 1 << 20,
            total_alloc: 9 << 20,
            sys: 64 << 20,
            lookups: 0,
            mallocs: 4_000,
            frees: 3_100,
            heap_alloc: 1 << 20,
            heap_sys: 8 << 20,
            heap_idle: 2 << 20,
            heap_inuse: 6 << 20,
            heap_released: 1 << 19,
            heap_objects: 900,
            stack_inuse: 1 << 16,
            stack_sys: 1 << 16,
            mspan_inuse: 4_096,
            mspan_sys: 8_192,
            mcache_inuse: 1_200,
            mcache_sys: 16_384,
            other_sys: 77,
            gc_sys: 2 << 20,
            next_gc: 4 << 20,
            last_gc: 1_700_000_000_000_000_000,
            pause_total_ns: 1_250_000,
            pause_ns: 41_000,
            num_gc: 17,
            gc_cpu_fraction: 0.012_345_678_9,
        }
    }

    #[test]
    fn narrow_saturates() {
        assert_eq!(narrow(0), 0);
        assert_eq!(narrow(i64::MAX as u64), i64::MAX);
        assert_eq!(narrow(u64::MAX), i64::MAX);
    }

    #[test]
    fn map_round_trip_preserves_values() {
        let fields = populated();
        let map = fields.to_map();
        assert_eq!(map.len(), Fields::KEYS.len());
        assert_eq!(
            map.get("mem.gc.cpu_fraction"),
            Some(&FieldValue::Float(0.012_345_678_9))
        );
        assert_eq!(Fields::from_map(map), Ok(fields));
    }

    #[test]
    fn json_uses_dotted_keys() {
        let fields = populated();
        let json = serde_json::to_value(fields).expect("serialize");
        assert_eq!(json["cpu.goroutines"], 12);
        assert_eq!(json["mem.heap.objects"], 900);

        let map: BTreeMap<String, FieldValue> =
            serde_json::from_value(json.clone()).expect("flat map");
        assert_eq!(Fields::from_map(map), Ok(fields));

        let back: Fields = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, fields);
    }

    #[test]
    fn from_map_rejects_bad_input() {
        let mut map: BTreeMap<String, FieldValue> = Fields::default()
            .to_map()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        map.remove("mem.gc.count");
        assert_eq!(
            Fields::from_map(map.clone()),
            Err(FieldsError::MissingKey("mem.gc.count"))
        );

        map.insert("mem.gc.count".into(), FieldValue::Float(1.5));
        assert_eq!(
            Fields::from_map(map.clone()),
            Err(FieldsError::KindMismatch { key: "mem.gc.count" })
        );

        map.insert("mem.gc.count".into(), FieldValue::Int(1));
        map.insert("mem.bogus".into(), FieldValue::Int(1));
        assert_eq!(
            Fields::from_map(map),
            Err(FieldsError::UnknownKey("mem.bogus".into()))
        );
    }

    #[test]
    fn last_gc_time_converts_nanoseconds() {
        assert_eq!(Fields::default().last_gc_time(), None);
        let when = populated().last_gc_time().expect("gc happened");
        assert_eq!(when.timestamp(), 1_700_000_000);
    }
}
