use chrono::{DateTime, Utc};

/// 目标对象是否需要被覆盖
///
/// 全量模式总是覆盖；增量模式下目标不存在或源更新时才覆盖，时间相同视为已同步。
pub fn should_overwrite(
    source_last_modified: DateTime<Utc>,
    destination_last_modified: Option<DateTime<Utc>>,
    is_incremental: bool,
) -> bool {
    if !is_incremental {
        return true;
    }

    match destination_last_modified {
        None => true,
        Some(destination) => source_last_modified > destination,
    }
}
