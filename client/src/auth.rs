// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mqtt_codec::auth::AuthPacket;

/// Enhanced-authentication callback, spec.md §4.7: invoked with the
/// broker's AUTH packet, produces the AUTH packet to send back. The
/// session core loops this until the broker answers with CONNACK or
/// AUTH(success).
pub type AuthFlow = Arc<
    dyn Fn(AuthPacket) -> Pin<Box<dyn Future<Output = AuthPacket> + Send>> + Send + Sync,
>;

/// Wrap a plain async closure as an [`AuthFlow`].
pub fn authflow<F, Fut>(f: F) -> AuthFlow
where
    F: Fn(AuthPacket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AuthPacket> + Send + 'static,
{
    Arc::new(move |packet| Box::pin(f(packet)))
}
