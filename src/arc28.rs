//! Structured event decoding from application logs. Each declared event schema is keyed by
//! a 4-byte selector; logs carrying a known selector have their argument tail decoded into
//! named, typed values.

use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::{anyhow, bail, Result};
use base64::Engine;
use sha2::{Digest, Sha512_256};

use crate::transaction::{AbiValue, Arc28Event};

const SELECTOR_LEN: usize = 4;

/// The supported ABI argument types. Dynamic tuples and nested structs are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiType {
	Uint64,
	Uint32,
	Byte,
	Address,
	FixedBytes(usize),
	String,
}

impl fmt::Display for AbiType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AbiType::Uint64 => f.write_str("uint64"),
			AbiType::Uint32 => f.write_str("uint32"),
			AbiType::Byte => f.write_str("byte"),
			AbiType::Address => f.write_str("address"),
			AbiType::FixedBytes(n) => write!(f, "byte[{n}]"),
			AbiType::String => f.write_str("string"),
		}
	}
}

impl FromStr for AbiType {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self> {
		Ok(match s {
			"uint64" => AbiType::Uint64,
			"uint32" => AbiType::Uint32,
			"byte" => AbiType::Byte,
			"address" => AbiType::Address,
			"string" => AbiType::String,
			other => {
				let n = other
					.strip_prefix("byte[")
					.and_then(|rest| rest.strip_suffix(']'))
					.and_then(|n| n.parse::<usize>().ok())
					.ok_or_else(|| anyhow!("unsupported ABI type {other:?}"))?;
				AbiType::FixedBytes(n)
			},
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventArg {
	pub name: String,
	pub abi_type: AbiType,
}

/// A declared `(group, event, args)` schema. The group name is carried through to decoded
/// events so consumers can tell same-named events from different contracts apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
	pub group_name: String,
	pub event_name: String,
	pub args: Vec<EventArg>,
}

impl EventSchema {
	/// The canonical signature string `EventName(type1,type2,…)`.
	pub fn signature(&self) -> String {
		format!(
			"{}({})",
			self.event_name,
			self.args.iter().map(|arg| arg.abi_type.to_string()).collect::<Vec<_>>().join(",")
		)
	}

	pub fn selector(&self) -> [u8; SELECTOR_LEN] {
		selector_for_signature(&self.signature())
	}
}

/// The first 4 bytes of the 256-bit digest of a canonical signature string.
pub fn selector_for_signature(signature: &str) -> [u8; SELECTOR_LEN] {
	let digest = Sha512_256::digest(signature.as_bytes());
	let mut selector = [0u8; SELECTOR_LEN];
	selector.copy_from_slice(&digest[..SELECTOR_LEN]);
	selector
}

/// Declared schemas indexed by selector, built once per subscription.
#[derive(Debug, Default, Clone)]
pub struct SelectorMap {
	by_selector: BTreeMap<[u8; SELECTOR_LEN], EventSchema>,
}

impl SelectorMap {
	/// Selector collisions across declared schemas resolve first-declared-wins.
	pub fn new(schemas: &[EventSchema]) -> Self {
		let mut by_selector = BTreeMap::new();
		for schema in schemas {
			by_selector.entry(schema.selector()).or_insert_with(|| schema.clone());
		}
		Self { by_selector }
	}

	pub fn is_empty(&self) -> bool {
		self.by_selector.is_empty()
	}

	/// Decodes every log with a declared selector. Logs shorter than a selector, logs with
	/// no matching selector, and logs whose argument tail fails to decode are skipped; the
	/// last case logs a diagnostic.
	pub fn decode_logs(&self, transaction_id: &str, logs: &[String]) -> Vec<Arc28Event> {
		if self.by_selector.is_empty() {
			return vec![];
		}

		logs.iter()
			.filter_map(|log| {
				let bytes = match base64::engine::general_purpose::STANDARD.decode(log) {
					Ok(bytes) => bytes,
					Err(e) => {
						tracing::warn!("Undecodable log on transaction {transaction_id}: {e}");
						return None;
					},
				};
				if bytes.len() < SELECTOR_LEN {
					return None;
				}
				let selector: [u8; SELECTOR_LEN] = bytes[..SELECTOR_LEN].try_into().unwrap();
				let schema = self.by_selector.get(&selector)?;

				match decode_event_args(schema, &bytes[SELECTOR_LEN..]) {
					Ok(args) => Some(Arc28Event {
						group_name: schema.group_name.clone(),
						event_name: schema.event_name.clone(),
						signature: schema.signature(),
						args,
					}),
					Err(e) => {
						tracing::warn!(
							"Skipping undecodable {} event on transaction {transaction_id}: {e}",
							schema.signature()
						);
						None
					},
				}
			})
			.collect()
	}
}

fn decode_event_args(schema: &EventSchema, data: &[u8]) -> Result<BTreeMap<String, AbiValue>> {
	let mut args = BTreeMap::new();
	let mut offset = 0usize;

	for arg in &schema.args {
		let (value, consumed) = decode_abi_value(arg.abi_type, &data[offset..])
			.map_err(|e| anyhow!("argument {:?}: {e}", arg.name))?;
		args.insert(arg.name.clone(), value);
		offset += consumed;
	}

	Ok(args)
}

fn take<'d>(data: &'d [u8], len: usize) -> Result<&'d [u8]> {
	if data.len() < len {
		bail!("needed {len} bytes, {} remaining", data.len());
	}
	Ok(&data[..len])
}

fn decode_abi_value(abi_type: AbiType, data: &[u8]) -> Result<(AbiValue, usize)> {
	Ok(match abi_type {
		AbiType::Uint64 => {
			let bytes = take(data, 8)?;
			(AbiValue::Uint(u64::from_be_bytes(bytes.try_into().unwrap())), 8)
		},
		AbiType::Uint32 => {
			let bytes = take(data, 4)?;
			(AbiValue::Uint(u32::from_be_bytes(bytes.try_into().unwrap()) as u64), 4)
		},
		AbiType::Byte => (AbiValue::Uint(take(data, 1)?[0] as u64), 1),
		AbiType::Address => {
			let bytes = take(data, 32)?;
			(AbiValue::Bytes(base64::engine::general_purpose::STANDARD.encode(bytes)), 32)
		},
		AbiType::FixedBytes(n) => {
			let bytes = take(data, n)?;
			(AbiValue::Bytes(base64::engine::general_purpose::STANDARD.encode(bytes)), n)
		},
		AbiType::String => {
			let len_bytes = take(data, 2)?;
			let len = u16::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
			let bytes = take(&data[2..], len)?;
			(
				AbiValue::Text(
					std::str::from_utf8(bytes)
						.map_err(|e| anyhow!("invalid utf-8 string payload: {e}"))?
						.to_string(),
				),
				2 + len,
			)
		},
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn transfer_schema() -> EventSchema {
		EventSchema {
			group_name: "TestEvents".to_string(),
			event_name: "Transfer".to_string(),
			args: vec![
				EventArg { name: "from".to_string(), abi_type: AbiType::Address },
				EventArg { name: "to".to_string(), abi_type: AbiType::Address },
				EventArg { name: "amount".to_string(), abi_type: AbiType::Uint64 },
			],
		}
	}

	fn encode_log(bytes: &[u8]) -> String {
		base64::engine::general_purpose::STANDARD.encode(bytes)
	}

	#[test]
	fn signature_is_canonical() {
		assert_eq!(transfer_schema().signature(), "Transfer(address,address,uint64)");
	}

	#[test]
	fn selector_depends_only_on_the_signature() {
		let mut renamed_args = transfer_schema();
		for (arg, name) in renamed_args.args.iter_mut().zip(["a", "b", "c"]) {
			arg.name = name.to_string();
		}
		assert_eq!(transfer_schema().selector(), renamed_args.selector());

		let mut different_types = transfer_schema();
		different_types.args[2].abi_type = AbiType::Uint32;
		assert_ne!(transfer_schema().selector(), different_types.selector());
	}

	#[test]
	fn decodes_a_matching_log() {
		let schema = transfer_schema();
		let mut log = schema.selector().to_vec();
		log.extend([b'A'; 32]);
		log.extend([b'B'; 32]);
		log.extend(1000u64.to_be_bytes());

		let events = SelectorMap::new(&[schema]).decode_logs("TXID", &[encode_log(&log)]);

		assert_eq!(events.len(), 1);
		let event = &events[0];
		assert_eq!(event.group_name, "TestEvents");
		assert_eq!(event.event_name, "Transfer");
		assert_eq!(event.signature, "Transfer(address,address,uint64)");
		assert_eq!(event.args["from"], AbiValue::Bytes(encode_log(&[b'A'; 32])));
		assert_eq!(event.args["to"], AbiValue::Bytes(encode_log(&[b'B'; 32])));
		assert_eq!(event.args["amount"], AbiValue::Uint(1000));
	}

	#[test]
	fn skips_short_unknown_and_truncated_logs() {
		let schema = transfer_schema();
		let selector_map = SelectorMap::new(&[schema.clone()]);

		// Shorter than a selector.
		assert!(selector_map.decode_logs("TXID", &[encode_log(&[1, 2, 3])]).is_empty());

		// No matching selector.
		let mut unknown = vec![0xde, 0xad, 0xbe, 0xef];
		unknown.extend([0u8; 72]);
		assert!(selector_map.decode_logs("TXID", &[encode_log(&unknown)]).is_empty());

		// Matching selector but the arguments run past end-of-data; no partial event.
		let mut truncated = schema.selector().to_vec();
		truncated.extend([b'A'; 32]);
		assert!(selector_map.decode_logs("TXID", &[encode_log(&truncated)]).is_empty());
	}

	#[test]
	fn first_declared_schema_wins_selector_collisions() {
		let first = transfer_schema();
		let mut second = transfer_schema();
		second.group_name = "OtherGroup".to_string();

		let mut log = first.selector().to_vec();
		log.extend([0u8; 72]);

		let events =
			SelectorMap::new(&[first, second]).decode_logs("TXID", &[encode_log(&log)]);
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].group_name, "TestEvents");
	}

	#[test]
	fn decodes_strings_and_fixed_bytes() {
		let schema = EventSchema {
			group_name: "G".to_string(),
			event_name: "Tagged".to_string(),
			args: vec![
				EventArg { name: "tag".to_string(), abi_type: AbiType::FixedBytes(2) },
				EventArg { name: "kind".to_string(), abi_type: AbiType::Byte },
				EventArg { name: "label".to_string(), abi_type: AbiType::String },
			],
		};
		assert_eq!(schema.signature(), "Tagged(byte[2],byte,string)");

		let mut log = schema.selector().to_vec();
		log.extend([0xab, 0xcd]);
		log.push(7);
		log.extend((5u16).to_be_bytes());
		log.extend(b"hello");

		let events = SelectorMap::new(&[schema]).decode_logs("TXID", &[encode_log(&log)]);
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].args["tag"], AbiValue::Bytes(encode_log(&[0xab, 0xcd])));
		assert_eq!(events[0].args["kind"], AbiValue::Uint(7));
		assert_eq!(events[0].args["label"], AbiValue::Text("hello".to_string()));
	}

	#[test]
	fn abi_types_parse_from_canonical_names() {
		assert_eq!("uint64".parse::<AbiType>().unwrap(), AbiType::Uint64);
		assert_eq!("byte[32]".parse::<AbiType>().unwrap(), AbiType::FixedBytes(32));
		assert!("uint256[]".parse::<AbiType>().is_err());
	}
}
