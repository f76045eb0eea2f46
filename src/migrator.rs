use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_catalog_tables::Migration),
            Box::new(m20240601_000002_create_cart_tables::Migration),
            Box::new(m20240601_000003_create_sales_tables::Migration),
            Box::new(m20240601_000004_create_sales_rule_tables::Migration),
            Box::new(m20240601_000005_create_newsletter_table::Migration),
            Box::new(m20240601_000006_create_core_config_table::Migration),
            Box::new(m20240601_000007_create_meta_tables::Migration),
        ]
    }
}

mod m20240601_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CatalogProducts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CatalogProducts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CatalogProducts::Sku)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(CatalogProducts::Name).string().not_null())
                        .col(
                            ColumnDef::new(CatalogProducts::Price)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CatalogProducts::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(CatalogProducts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CatalogProducts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CatalogProducts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CatalogProducts {
        Table,
        Id,
        Sku,
        Name,
        Price,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_cart_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_cart_tables"
        }
    }

    fn money(col: Carts) -> ColumnDef {
        ColumnDef::new(col)
            .decimal_len(16, 4)
            .not_null()
            .default(0)
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Carts::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Carts::MaskedId)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Carts::StoreId).integer().null())
                        .col(
                            ColumnDef::new(Carts::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Carts::CustomerEmail).string().null())
                        .col(ColumnDef::new(Carts::CustomerFirstname).string().null())
                        .col(ColumnDef::new(Carts::CustomerLastname).string().null())
                        .col(ColumnDef::new(Carts::PaymentMethod).string().null())
                        .col(ColumnDef::new(Carts::CouponCode).string().null())
                        .col(ColumnDef::new(Carts::Currency).string_len(3).not_null())
                        .col(money(Carts::Subtotal))
                        .col(money(Carts::DiscountAmount))
                        .col(money(Carts::TaxAmount))
                        .col(money(Carts::ShippingAmount))
                        .col(money(Carts::GrandTotal))
                        .col(ColumnDef::new(Carts::ShippingMethod).string().null())
                        .col(ColumnDef::new(Carts::ReservedOrderId).string().null())
                        .col(
                            ColumnDef::new(Carts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Sku).string().not_null())
                        .col(ColumnDef::new(CartItems::Name).string().not_null())
                        .col(ColumnDef::new(CartItems::Qty).integer().not_null())
                        .col(
                            ColumnDef::new(CartItems::Price)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::RowTotal)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::DiscountAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CartItems::ExternalTaxAmount)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_cart")
                                .from(CartItems::Table, CartItems::CartId)
                                .to(Carts::Table, Carts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_cart_items_cart_id")
                        .table(CartItems::Table)
                        .col(CartItems::CartId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum Carts {
        Table,
        Id,
        MaskedId,
        StoreId,
        IsActive,
        CustomerEmail,
        CustomerFirstname,
        CustomerLastname,
        PaymentMethod,
        CouponCode,
        Currency,
        Subtotal,
        DiscountAmount,
        TaxAmount,
        ShippingAmount,
        GrandTotal,
        ShippingMethod,
        ReservedOrderId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        CartId,
        Sku,
        Name,
        Qty,
        Price,
        RowTotal,
        DiscountAmount,
        ExternalTaxAmount,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000003_create_sales_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_sales_tables"
        }
    }

    fn money<T: IntoIden>(col: T) -> ColumnDef {
        ColumnDef::new(col)
            .decimal_len(16, 4)
            .not_null()
            .default(0)
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::IncrementId)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(SalesOrders::StoreId).integer().not_null())
                        .col(ColumnDef::new(SalesOrders::CartId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrders::State).string_len(20).not_null())
                        .col(ColumnDef::new(SalesOrders::Status).string_len(20).not_null())
                        .col(ColumnDef::new(SalesOrders::CustomerEmail).string().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::CustomerFirstname)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::CustomerLastname)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrders::PaymentMethod).string().not_null())
                        .col(ColumnDef::new(SalesOrders::CouponCode).string().null())
                        .col(ColumnDef::new(SalesOrders::Currency).string_len(3).not_null())
                        .col(money(SalesOrders::Subtotal))
                        .col(money(SalesOrders::DiscountAmount))
                        .col(money(SalesOrders::TaxAmount))
                        .col(money(SalesOrders::ShippingAmount))
                        .col(money(SalesOrders::GrandTotal))
                        .col(ColumnDef::new(SalesOrders::ShippingMethod).string().null())
                        .col(
                            ColumnDef::new(SalesOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderItems::Sku).string().not_null())
                        .col(ColumnDef::new(SalesOrderItems::Name).string().not_null())
                        .col(
                            ColumnDef::new(SalesOrderItems::QtyOrdered)
                                .integer()
                                .not_null(),
                        )
                        .col(money(SalesOrderItems::Price))
                        .col(money(SalesOrderItems::RowTotal))
                        .col(money(SalesOrderItems::DiscountAmount))
                        .col(money(SalesOrderItems::TaxAmount))
                        .col(
                            ColumnDef::new(SalesOrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_order_items_order")
                                .from(SalesOrderItems::Table, SalesOrderItems::OrderId)
                                .to(SalesOrders::Table, SalesOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesInvoices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesInvoices::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesInvoices::OrderId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(SalesInvoices::IncrementId)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(SalesInvoices::State).string_len(20).not_null())
                        .col(money(SalesInvoices::GrandTotal))
                        .col(
                            ColumnDef::new(SalesInvoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_invoices_order")
                                .from(SalesInvoices::Table, SalesInvoices::OrderId)
                                .to(SalesOrders::Table, SalesOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sales_order_items_order_id")
                        .table(SalesOrderItems::Table)
                        .col(SalesOrderItems::OrderId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesInvoices::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum SalesOrders {
        Table,
        Id,
        IncrementId,
        StoreId,
        CartId,
        State,
        Status,
        CustomerEmail,
        CustomerFirstname,
        CustomerLastname,
        PaymentMethod,
        CouponCode,
        Currency,
        Subtotal,
        DiscountAmount,
        TaxAmount,
        ShippingAmount,
        GrandTotal,
        ShippingMethod,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SalesOrderItems {
        Table,
        Id,
        OrderId,
        Sku,
        Name,
        QtyOrdered,
        Price,
        RowTotal,
        DiscountAmount,
        TaxAmount,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum SalesInvoices {
        Table,
        Id,
        OrderId,
        IncrementId,
        State,
        GrandTotal,
        CreatedAt,
    }
}

mod m20240601_000004_create_sales_rule_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_sales_rule_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesRules::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesRules::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(SalesRules::StoreId).integer().null())
                        .col(ColumnDef::new(SalesRules::Name).string().not_null())
                        .col(
                            ColumnDef::new(SalesRules::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(SalesRules::DiscountType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesRules::DiscountAmount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesRules::CouponPrefix)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(SalesRules::CouponSuffix)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(SalesRules::CouponLength)
                                .integer()
                                .not_null()
                                .default(12),
                        )
                        .col(
                            ColumnDef::new(SalesRules::CouponFormat)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesRules::CouponDashEvery)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesRules::UsesPerCoupon)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(SalesRules::FromDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SalesRules::ToDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SalesRules::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesCoupons::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesCoupons::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(SalesCoupons::RuleId).integer().not_null())
                        .col(
                            ColumnDef::new(SalesCoupons::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(SalesCoupons::UsageLimit)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(SalesCoupons::TimesUsed)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesCoupons::ExpirationDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SalesCoupons::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_coupons_rule")
                                .from(SalesCoupons::Table, SalesCoupons::RuleId)
                                .to(SalesRules::Table, SalesRules::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesCoupons::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesRules::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SalesRules {
        Table,
        Id,
        StoreId,
        Name,
        IsActive,
        DiscountType,
        DiscountAmount,
        CouponPrefix,
        CouponSuffix,
        CouponLength,
        CouponFormat,
        CouponDashEvery,
        UsesPerCoupon,
        FromDate,
        ToDate,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum SalesCoupons {
        Table,
        Id,
        RuleId,
        Code,
        UsageLimit,
        TimesUsed,
        ExpirationDate,
        CreatedAt,
    }
}

mod m20240601_000005_create_newsletter_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_newsletter_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(NewsletterSubscribers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(NewsletterSubscribers::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(NewsletterSubscribers::StoreId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterSubscribers::ExternalBusinessId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterSubscribers::Email)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterSubscribers::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterSubscribers::CouponCode)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterSubscribers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterSubscribers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("uq_newsletter_business_email")
                        .table(NewsletterSubscribers::Table)
                        .col(NewsletterSubscribers::ExternalBusinessId)
                        .col(NewsletterSubscribers::Email)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(NewsletterSubscribers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum NewsletterSubscribers {
        Table,
        Id,
        StoreId,
        ExternalBusinessId,
        Email,
        Status,
        CouponCode,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000006_create_core_config_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000006_create_core_config_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CoreConfigData::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CoreConfigData::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(CoreConfigData::StoreId)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(CoreConfigData::Path).string().not_null())
                        .col(ColumnDef::new(CoreConfigData::Value).text().null())
                        .col(
                            ColumnDef::new(CoreConfigData::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("uq_core_config_scope_path")
                        .table(CoreConfigData::Table)
                        .col(CoreConfigData::StoreId)
                        .col(CoreConfigData::Path)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CoreConfigData::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CoreConfigData {
        Table,
        Id,
        StoreId,
        Path,
        Value,
        UpdatedAt,
    }
}

mod m20240601_000007_create_meta_tables {
    use super::m20240601_000003_create_sales_tables::SalesOrders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000007_create_meta_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(FacebookSalesOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(FacebookSalesOrders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(FacebookSalesOrders::MagentoOrderId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(FacebookSalesOrders::FacebookOrderId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(FacebookSalesOrders::Channel)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FacebookSalesOrders::ExtraData)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FacebookSalesOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FacebookSalesOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_facebook_sales_orders_order")
                                .from(
                                    FacebookSalesOrders::Table,
                                    FacebookSalesOrders::MagentoOrderId,
                                )
                                .to(SalesOrders::Table, SalesOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(FacebookInstalledFeatures::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(FacebookInstalledFeatures::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(FacebookInstalledFeatures::StoreId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FacebookInstalledFeatures::FeatureInstanceId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FacebookInstalledFeatures::FeatureType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FacebookInstalledFeatures::ConnectedAssets)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FacebookInstalledFeatures::AdditionalInfo)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FacebookInstalledFeatures::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_installed_features_store")
                        .table(FacebookInstalledFeatures::Table)
                        .col(FacebookInstalledFeatures::StoreId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(FacebookInstalledFeatures::Table)
                        .to_owned(),
                )
                .await?;
            manager
                .drop_table(Table::drop().table(FacebookSalesOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum FacebookSalesOrders {
        Table,
        Id,
        MagentoOrderId,
        FacebookOrderId,
        Channel,
        ExtraData,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum FacebookInstalledFeatures {
        Table,
        Id,
        StoreId,
        FeatureInstanceId,
        FeatureType,
        ConnectedAssets,
        AdditionalInfo,
        CreatedAt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectOptions, Database};

    const TABLES: [&str; 12] = [
        "catalog_products",
        "carts",
        "cart_items",
        "sales_orders",
        "sales_order_items",
        "sales_invoices",
        "sales_rules",
        "sales_coupons",
        "newsletter_subscribers",
        "core_config_data",
        "facebook_sales_orders",
        "facebook_installed_features",
    ];

    async fn sqlite_memory() -> sea_orm::DatabaseConnection {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1);
        Database::connect(opt).await.unwrap()
    }

    #[tokio::test]
    async fn migrations_run_on_sqlite() {
        let db = sqlite_memory().await;
        Migrator::up(&db, None).await.unwrap();

        let manager = SchemaManager::new(&db);
        for table in TABLES {
            assert!(manager.has_table(table).await.unwrap(), "missing {table}");
        }
        assert!(Migrator::get_pending_migrations(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn migrations_roll_back_cleanly() {
        let db = sqlite_memory().await;
        Migrator::up(&db, None).await.unwrap();
        Migrator::down(&db, None).await.unwrap();

        let manager = SchemaManager::new(&db);
        for table in TABLES {
            assert!(!manager.has_table(table).await.unwrap(), "left {table}");
        }
    }
}
