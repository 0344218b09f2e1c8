// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod adapters;
pub mod notify;
pub mod signal_bus;

pub use adapters::{AdapterError, DataSourceAdapter, NullAdapter, StaticIntelFeed, ThreatIntelFeed};
pub use notify::{LogNotifier, NotificationRoute, NotificationSink, NotifyError, WebhookNotifier};
pub use signal_bus::{SignalBus, SignalBusError, SignalReceiver};
