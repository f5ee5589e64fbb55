//! Operation registry: the bridge allowlist.
//!
//! Every operation the bridge will ever consider executing is declared once in
//! the [`operation_registry!`] invocation below. The macro generates the
//! [`Operation`] enum, name lookup, and the capability each operation requires,
//! so the allowlist and the bridge's exhaustive dispatch `match` cannot drift
//! apart.

use crate::capability::Capability;

/// Generates [`Operation`] and its lookup tables from one list.
///
/// ```ignore
/// operation_registry! {
///   Ping => "ping" { capability: None },
///   DomQuery => "dom.query" { capability: Some(Capability::DomRead) },
/// }
/// ```
macro_rules! operation_registry {
	(
		$(
			$(#[$meta:meta])*
			$id:ident => $name:literal { capability: $cap:expr }
		),+ $(,)?
	) => {
		/// Allowlisted bridge operation.
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
		pub enum Operation {
			$( $(#[$meta])* $id ),+
		}

		impl Operation {
			/// Every allowlisted operation, in declaration order.
			pub const ALL: &'static [Operation] = &[ $( Operation::$id ),+ ];

			/// Resolves a wire `type` to an allowlisted operation.
			pub fn lookup(name: &str) -> Option<Operation> {
				match name {
					$( $name => Some(Operation::$id), )+
					_ => None,
				}
			}

			/// Wire name of the operation.
			pub fn name(self) -> &'static str {
				match self {
					$( Operation::$id => $name, )+
				}
			}

			/// Capability that must be granted before the operation runs.
			///
			/// `None` marks lifecycle operations that are always reachable.
			pub fn capability(self) -> Option<Capability> {
				match self {
					$( Operation::$id => $cap, )+
				}
			}
		}
	};
}

operation_registry! {
	/// Sets accepted origin, token and capability grant.
	Init => "init" { capability: None },
	/// Liveness check.
	Ping => "ping" { capability: None },
	/// Returns the current grant.
	Capabilities => "capabilities" { capability: None },
	DomQuery => "dom.query" { capability: Some(Capability::DomRead) },
	DomGet => "dom.get" { capability: Some(Capability::DomRead) },
	DomSetText => "dom.setText" { capability: Some(Capability::DomWrite) },
	/// Replaces inner markup. Keep `dom_write` off for untrusted content.
	DomSetHtml => "dom.setHTML" { capability: Some(Capability::DomWrite) },
	DomSetAttr => "dom.setAttr" { capability: Some(Capability::DomWrite) },
	DomAddClass => "dom.addClass" { capability: Some(Capability::DomWrite) },
	DomRemoveClass => "dom.removeClass" { capability: Some(Capability::DomWrite) },
	DomStyle => "dom.style" { capability: Some(Capability::DomWrite) },
	NetFetch => "net.fetch" { capability: Some(Capability::NetFetch) },
	StorageGet => "storage.get" { capability: Some(Capability::Storage) },
	StorageSet => "storage.set" { capability: Some(Capability::Storage) },
	StorageDel => "storage.del" { capability: Some(Capability::Storage) },
	/// Invokes a locally registered script by id.
	ScriptRun => "script.run" { capability: Some(Capability::ScriptRun) },
	ConsoleLog => "console.log" { capability: Some(Capability::Console) },
	ConsoleWarn => "console.warn" { capability: Some(Capability::Console) },
	ConsoleError => "console.error" { capability: Some(Capability::Console) },
}

impl Operation {
	/// Lifecycle operations are answered before the bridge is initialized.
	pub fn is_lifecycle(self) -> bool {
		self.capability().is_none()
	}
}

impl std::fmt::Display for Operation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}
