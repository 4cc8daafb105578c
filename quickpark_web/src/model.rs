pub mod payment;
pub mod reservation;
pub mod spot;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

/// 表示用のタイムゾーンに変換する
pub(crate) fn local(at: DateTime<Utc>, offset: &FixedOffset) -> DateTime<FixedOffset> {
    at.with_timezone(offset)
}

/// 一覧の件数
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    pub total: usize,
}
