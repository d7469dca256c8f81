use crawler_core::CrawlerResult;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

/// 以 `BEGIN IMMEDIATE` 开启的写事务
///
/// 开始时即获取写锁，先读后写的检查与插入不会在升级写锁时返回 `SQLITE_BUSY`；
/// 等待写锁受连接的 `busy_timeout` 约束。未提交即被丢弃时关闭该连接，
/// 由 SQLite 回滚未完成的事务。
pub struct ImmediateTransaction {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

impl ImmediateTransaction {
    pub async fn begin(pool: &SqlitePool) -> CrawlerResult<Self> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn, open: true })
    }

    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub async fn commit(mut self) -> CrawlerResult<()> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.open = false;
        Ok(())
    }

    pub async fn rollback(mut self) -> CrawlerResult<()> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.open = false;
        Ok(())
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if self.open {
            self.conn.close_on_drop();
        }
    }
}
