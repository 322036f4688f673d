//! Resource state registries: fixed integer/name tables per resource kind.
//!
//! Each registry is its own enum, never merged with the others: the raw value
//! 3 is `ERROR` for a host, `ACTIVE` for a VM and `RUNNING` for an LCM state.
//! Members display as their bare integer (the form the wire uses); the
//! symbolic name is available explicitly via [`name`](HostState::name).

use core::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("{registry} has no value {value}")]
    UnknownValue { registry: &'static str, value: i64 },
    #[error("{registry} has no member named {name}")]
    UnknownName { registry: &'static str, name: String },
}

macro_rules! state_registry {
    (
        $(#[$meta:meta])*
        $registry:ident {
            $( $variant:ident = $value:literal => $name:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i64)]
        pub enum $registry {
            $( $variant = $value ),+
        }

        impl $registry {
            /// Look up a member by its raw integer value.
            pub fn from_raw(value: i64) -> Result<Self, StateError> {
                match value {
                    $( $value => Ok(Self::$variant), )+
                    other => Err(StateError::UnknownValue {
                        registry: stringify!($registry),
                        value: other,
                    }),
                }
            }

            /// Look up a member by its wire name.
            pub fn from_name(name: &str) -> Result<Self, StateError> {
                match name {
                    $( $name => Ok(Self::$variant), )+
                    other => Err(StateError::UnknownName {
                        registry: stringify!($registry),
                        name: other.to_string(),
                    }),
                }
            }

            /// The raw integer value of the member.
            pub const fn value(self) -> i64 {
                self as i64
            }

            /// The stable wire name of the member.
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )+
                }
            }
        }

        impl fmt::Display for $registry {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.value())
            }
        }

        impl PartialEq<i64> for $registry {
            fn eq(&self, other: &i64) -> bool {
                self.value() == *other
            }
        }

        impl PartialEq<$registry> for i64 {
            fn eq(&self, other: &$registry) -> bool {
                *self == other.value()
            }
        }
    };
}

state_registry! {
    /// Host lifecycle states as reported in a host's `STATE` element.
    HostState {
        Init = 0 => "INIT",
        MonitoringMonitored = 1 => "MONITORING_MONITORED",
        Monitored = 2 => "MONITORED",
        Error = 3 => "ERROR",
        Disabled = 4 => "DISABLED",
        MonitoringError = 5 => "MONITORING_ERROR",
        MonitoringInit = 6 => "MONITORING_INIT",
        MonitoringDisabled = 7 => "MONITORING_DISABLED",
        Offline = 8 => "OFFLINE",
    }
}

state_registry! {
    /// Administrative host status, the argument of the host status call.
    HostStatus {
        Enabled = 0 => "ENABLED",
        Disabled = 1 => "DISABLED",
        Offline = 2 => "OFFLINE",
    }
}

state_registry! {
    /// Top-level VM lifecycle states.
    VmState {
        Init = 0 => "INIT",
        Pending = 1 => "PENDING",
        Hold = 2 => "HOLD",
        Active = 3 => "ACTIVE",
        Stopped = 4 => "STOPPED",
        Suspended = 5 => "SUSPENDED",
        Done = 6 => "DONE",
        Poweroff = 8 => "POWEROFF",
        Undeployed = 9 => "UNDEPLOYED",
        Cloning = 10 => "CLONING",
        CloningFailure = 11 => "CLONING_FAILURE",
    }
}

state_registry! {
    /// VM life-cycle-manager sub-states, meaningful while the VM is ACTIVE.
    /// Values 13 and 14 were retired upstream and stay unmapped.
    LcmState {
        LcmInit = 0 => "LCM_INIT",
        Prolog = 1 => "PROLOG",
        Boot = 2 => "BOOT",
        Running = 3 => "RUNNING",
        Migrate = 4 => "MIGRATE",
        SaveStop = 5 => "SAVE_STOP",
        SaveSuspend = 6 => "SAVE_SUSPEND",
        SaveMigrate = 7 => "SAVE_MIGRATE",
        PrologMigrate = 8 => "PROLOG_MIGRATE",
        PrologResume = 9 => "PROLOG_RESUME",
        EpilogStop = 10 => "EPILOG_STOP",
        Epilog = 11 => "EPILOG",
        Shutdown = 12 => "SHUTDOWN",
        CleanupResubmit = 15 => "CLEANUP_RESUBMIT",
        Unknown = 16 => "UNKNOWN",
        Hotplug = 17 => "HOTPLUG",
        ShutdownPoweroff = 18 => "SHUTDOWN_POWEROFF",
        BootUnknown = 19 => "BOOT_UNKNOWN",
        BootPoweroff = 20 => "BOOT_POWEROFF",
        BootSuspended = 21 => "BOOT_SUSPENDED",
        BootStopped = 22 => "BOOT_STOPPED",
        CleanupDelete = 23 => "CLEANUP_DELETE",
        HotplugSnapshot = 24 => "HOTPLUG_SNAPSHOT",
        HotplugNic = 25 => "HOTPLUG_NIC",
        HotplugSaveas = 26 => "HOTPLUG_SAVEAS",
        HotplugSaveasPoweroff = 27 => "HOTPLUG_SAVEAS_POWEROFF",
        HotplugSaveasSuspended = 28 => "HOTPLUG_SAVEAS_SUSPENDED",
        ShutdownUndeploy = 29 => "SHUTDOWN_UNDEPLOY",
        EpilogUndeploy = 30 => "EPILOG_UNDEPLOY",
        PrologUndeploy = 31 => "PROLOG_UNDEPLOY",
        BootUndeploy = 32 => "BOOT_UNDEPLOY",
        HotplugPrologPoweroff = 33 => "HOTPLUG_PROLOG_POWEROFF",
    }
}

state_registry! {
    /// Image lifecycle states.
    ImageState {
        Init = 0 => "INIT",
        Ready = 1 => "READY",
        Used = 2 => "USED",
        Disabled = 3 => "DISABLED",
        Locked = 4 => "LOCKED",
        Error = 5 => "ERROR",
        Clone = 6 => "CLONE",
        Delete = 7 => "DELETE",
        UsedPers = 8 => "USED_PERS",
        LockedUsed = 9 => "LOCKED_USED",
        LockedUsedPers = 10 => "LOCKED_USED_PERS",
    }
}

state_registry! {
    /// Marketplace appliance states.
    MarketplaceAppState {
        Init = 0 => "INIT",
        Ready = 1 => "READY",
        Locked = 2 => "LOCKED",
        Error = 3 => "ERROR",
        Disabled = 4 => "DISABLED",
    }
}

state_registry! {
    /// Virtual network lifecycle states.
    VnState {
        Init = 0 => "INIT",
        Ready = 1 => "READY",
        LockCreate = 2 => "LOCK_CREATE",
        LockDelete = 3 => "LOCK_DELETE",
        Done = 4 => "DONE",
        Error = 5 => "ERROR",
        UpdateFailure = 6 => "UPDATE_FAILURE",
    }
}
