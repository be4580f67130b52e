use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_plans_table::Migration),
            Box::new(m20240101_000002_create_coupons_table::Migration),
            Box::new(m20240101_000003_create_orders_table::Migration),
            Box::new(m20240101_000004_create_subscriptions_table::Migration),
        ]
    }
}

mod m20240101_000001_create_plans_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_plans_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Plans::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Plans::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Plans::Name).string().not_null())
                        .col(ColumnDef::new(Plans::Description).string().null())
                        .col(
                            ColumnDef::new(Plans::Price)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Plans::DurationMonths).integer().not_null())
                        .col(ColumnDef::new(Plans::Features).json().not_null())
                        .col(
                            ColumnDef::new(Plans::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Plans::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Plans::UpdatedAt).timestamp_with_time_zone().null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Plans::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Plans {
        Table,
        Id,
        Name,
        Description,
        Price,
        DurationMonths,
        Features,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_coupons_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_coupons_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Coupons::Code)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Coupons::DiscountType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::DiscountValue)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Coupons::MaxUses).integer().null())
                        .col(
                            ColumnDef::new(Coupons::UsedCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Coupons::ValidFrom).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Coupons::ValidUntil).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Coupons::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Coupons::CreatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Coupons {
        Table,
        Id,
        Code,
        DiscountType,
        DiscountValue,
        MaxUses,
        UsedCount,
        ValidFrom,
        ValidUntil,
        IsActive,
        CreatedAt,
    }
}

mod m20240101_000003_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::PlanId).uuid().not_null())
                        .col(
                            ColumnDef::new(Orders::GrossAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::NetAmount)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Orders::CouponCode).string_len(50).null())
                        .col(
                            ColumnDef::new(Orders::PaymentStatus)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CheckoutSessionId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::PaymentIntentId).string().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp_with_time_zone().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_payment_intent_id")
                        .table(Orders::Table)
                        .col(Orders::PaymentIntentId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Orders {
        Table,
        Id,
        UserId,
        PlanId,
        GrossAmount,
        DiscountAmount,
        NetAmount,
        Currency,
        CouponCode,
        PaymentStatus,
        CheckoutSessionId,
        PaymentIntentId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_subscriptions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_subscriptions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Subscriptions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Subscriptions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Subscriptions::UserId).uuid().not_null())
                        .col(ColumnDef::new(Subscriptions::PlanId).uuid().not_null())
                        .col(
                            ColumnDef::new(Subscriptions::OrderId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Subscriptions::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Subscriptions::StartDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Subscriptions::EndDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Subscriptions::ExternalRef).string().null())
                        .col(
                            ColumnDef::new(Subscriptions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Subscriptions::UpdatedAt).timestamp_with_time_zone().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_subscriptions_user_id")
                        .table(Subscriptions::Table)
                        .col(Subscriptions::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_subscriptions_external_ref")
                        .table(Subscriptions::Table)
                        .col(Subscriptions::ExternalRef)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Subscriptions {
        Table,
        Id,
        UserId,
        PlanId,
        OrderId,
        Status,
        StartDate,
        EndDate,
        ExternalRef,
        CreatedAt,
        UpdatedAt,
    }
}
