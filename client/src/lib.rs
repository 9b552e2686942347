// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Async MQTT 3.1.1/5.0 client: a single-actor session core reached
//! through [`client::Client`], with transport, retry, keep-alive and
//! reachability concerns each split into their own module.

pub mod auth;
pub mod client;
pub mod connect_options;
pub mod endpoint;
pub mod error;
pub mod id_pool;
pub mod inflight;
pub mod message;
pub mod notification;
pub mod pinger;
pub mod reachability;
pub mod retrier;
pub mod session;
pub mod status;
pub mod task_table;
pub mod transport;

pub use auth::{authflow, AuthFlow};
pub use client::{Client, ClientBuilder};
pub use connect_options::{ConnectOptions, ConnectOptionsBuilder};
pub use endpoint::{ClientCredential, Endpoint, QuicOptions, TcpOptions, TlsOptions, TlsVersion, TrustPolicy};
pub use error::{ConnectFailureCode, ErrorKind, NetworkErrorKind, PacketError};
pub use message::{ConnectParams, Identity, Message, Will};
pub use notification::Notification;
pub use reachability::{AlwaysSatisfied, ManualMonitor, NetworkStatus, ReachabilityMonitor};
pub use retrier::{Policy, Retrier};
pub use status::{CloseReason, Status};
