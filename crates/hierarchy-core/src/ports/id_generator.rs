//! JidGenerator port - jid 生成の抽象化
//!
//! jid は通常 job-processing system から渡されますが、テストやデモで
//! 自前で投入するときはここから生成します。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース

use crate::domain::Jid;
use crate::ports::Clock;
use ulid::Ulid;

/// JidGenerator は分散環境で衝突しない jid を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait JidGenerator: Send + Sync {
    fn generate(&self) -> Jid;
}

/// UlidGenerator は ULID ベースの jid 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// FixedClock を使えば timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> JidGenerator for UlidGenerator<C> {
    fn generate(&self) -> Jid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        Jid::new(ulid.to_string())
    }
}
