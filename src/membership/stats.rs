//! Membership stats recomputation, invoked after any mutation that can
//! change a data product's asset set (§4.4).

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Error;
use crate::model::MembershipStats;
use crate::store::memberships::MembershipStore;

pub async fn recompute(pool: &PgPool, data_product_id: Uuid) -> Result<MembershipStats, Error> {
    MembershipStore::new(pool).stats(data_product_id).await
}
