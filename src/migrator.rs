use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_branches_and_profiles::Migration),
            Box::new(m20250101_000002_create_sales_tables::Migration),
            Box::new(m20250101_000003_create_document_tables::Migration),
            Box::new(m20250101_000004_create_hr_tables::Migration),
            Box::new(m20250101_000005_create_procurement_and_dispatch_tables::Migration),
        ]
    }
}

/// Column helpers shared by all migrations.
mod columns {
    use sea_orm_migration::prelude::*;
    use sea_orm_migration::sea_orm::DbBackend;

    /// Monetary column. SQLite has no exact decimal type, so it stores REAL.
    pub fn money<T: IntoIden>(col: T, backend: DbBackend) -> ColumnDef {
        let mut def = ColumnDef::new(col);
        match backend {
            DbBackend::Sqlite => def.double(),
            _ => def.decimal_len(14, 2),
        };
        def.not_null().default(0);
        def
    }

    pub fn money_null<T: IntoIden>(col: T, backend: DbBackend) -> ColumnDef {
        let mut def = ColumnDef::new(col);
        match backend {
            DbBackend::Sqlite => def.double(),
            _ => def.decimal_len(14, 2),
        };
        def.null();
        def
    }

    pub fn quantity<T: IntoIden>(col: T, backend: DbBackend) -> ColumnDef {
        let mut def = ColumnDef::new(col);
        match backend {
            DbBackend::Sqlite => def.double(),
            _ => def.decimal_len(14, 3),
        };
        def.not_null().default(0);
        def
    }

    pub fn id<T: IntoIden>(col: T) -> ColumnDef {
        ColumnDef::new(col).uuid().not_null().primary_key().to_owned()
    }

    pub fn created_at<T: IntoIden>(col: T) -> ColumnDef {
        ColumnDef::new(col)
            .timestamp_with_time_zone()
            .not_null()
            .to_owned()
    }

    /// Document totals written by the GST calculator.
    #[derive(DeriveIden, Clone, Copy)]
    pub enum Totals {
        Subtotal,
        DiscountTotal,
        TaxableTotal,
        CgstTotal,
        SgstTotal,
        IgstTotal,
        TaxTotal,
        RoundOff,
        GrandTotal,
    }

    pub fn add_totals(table: &mut TableCreateStatement, backend: DbBackend) {
        for col in [
            Totals::Subtotal,
            Totals::DiscountTotal,
            Totals::TaxableTotal,
            Totals::CgstTotal,
            Totals::SgstTotal,
            Totals::IgstTotal,
            Totals::TaxTotal,
            Totals::RoundOff,
            Totals::GrandTotal,
        ] {
            table.col(&mut money(col, backend));
        }
    }

    /// Columns every priced line item carries.
    #[derive(DeriveIden, Clone, Copy)]
    pub enum LineItem {
        LineNo,
        Name,
        Description,
        HsnCode,
        Quantity,
        Unit,
        UnitPrice,
        DiscountPercent,
        GstRate,
        GrossAmount,
        DiscountAmount,
        TaxableAmount,
        TaxAmount,
        LineTotal,
    }

    pub fn add_line_item(table: &mut TableCreateStatement, backend: DbBackend) {
        table
            .col(ColumnDef::new(LineItem::LineNo).integer().not_null())
            .col(ColumnDef::new(LineItem::Name).string().not_null())
            .col(ColumnDef::new(LineItem::Description).text().null())
            .col(ColumnDef::new(LineItem::HsnCode).string_len(16).null())
            .col(&mut quantity(LineItem::Quantity, backend))
            .col(ColumnDef::new(LineItem::Unit).string_len(16).null())
            .col(&mut money(LineItem::UnitPrice, backend))
            .col(&mut money(LineItem::DiscountPercent, backend))
            .col(&mut money(LineItem::GstRate, backend))
            .col(&mut money(LineItem::GrossAmount, backend))
            .col(&mut money(LineItem::DiscountAmount, backend))
            .col(&mut money(LineItem::TaxableAmount, backend))
            .col(&mut money(LineItem::TaxAmount, backend))
            .col(&mut money(LineItem::LineTotal, backend));
    }
}

mod m20250101_000001_create_branches_and_profiles {
    use super::columns::{created_at, id};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_branches_and_profiles"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Branches::Table)
                        .if_not_exists()
                        .col(&mut id(Branches::Id))
                        .col(ColumnDef::new(Branches::Name).string().not_null())
                        .col(
                            ColumnDef::new(Branches::Code)
                                .string_len(10)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Branches::StateCode).string_len(2).not_null())
                        .col(ColumnDef::new(Branches::Gstin).string_len(15).null())
                        .col(ColumnDef::new(Branches::Address).text().null())
                        .col(ColumnDef::new(Branches::Phone).string().null())
                        .col(ColumnDef::new(Branches::Email).string().null())
                        .col(
                            ColumnDef::new(Branches::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(&mut created_at(Branches::CreatedAt))
                        .col(&mut created_at(Branches::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Profiles::Table)
                        .if_not_exists()
                        .col(&mut id(Profiles::Id))
                        .col(ColumnDef::new(Profiles::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Profiles::FullName).string().not_null())
                        .col(ColumnDef::new(Profiles::Email).string().not_null())
                        .col(ColumnDef::new(Profiles::Phone).string().null())
                        .col(ColumnDef::new(Profiles::Role).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Profiles::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(&mut created_at(Profiles::CreatedAt))
                        .col(&mut created_at(Profiles::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_profiles_branch_id")
                                .from(Profiles::Table, Profiles::BranchId)
                                .to(Branches::Table, Branches::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_profiles_branch_id")
                        .table(Profiles::Table)
                        .col(Profiles::BranchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Profiles::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Branches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Branches {
        Table,
        Id,
        Name,
        Code,
        StateCode,
        Gstin,
        Address,
        Phone,
        Email,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Profiles {
        Table,
        Id,
        BranchId,
        FullName,
        Email,
        Phone,
        Role,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000002_create_sales_tables {
    use super::columns::{created_at, id, money, money_null};
    use super::m20250101_000001_create_branches_and_profiles::Branches;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();

            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(&mut id(Customers::Id))
                        .col(ColumnDef::new(Customers::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::Company).string().null())
                        .col(ColumnDef::new(Customers::Email).string().null())
                        .col(ColumnDef::new(Customers::Phone).string().null())
                        .col(ColumnDef::new(Customers::Gstin).string_len(15).null())
                        .col(ColumnDef::new(Customers::StateCode).string_len(2).null())
                        .col(ColumnDef::new(Customers::BillingAddress).text().null())
                        .col(ColumnDef::new(Customers::ShippingAddress).text().null())
                        .col(&mut money(Customers::OpeningBalance, backend))
                        .col(ColumnDef::new(Customers::CreatedBy).uuid().not_null())
                        .col(&mut created_at(Customers::CreatedAt))
                        .col(&mut created_at(Customers::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_customers_branch_id")
                                .from(Customers::Table, Customers::BranchId)
                                .to(Branches::Table, Branches::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_customers_branch_id")
                        .table(Customers::Table)
                        .col(Customers::BranchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LeadSources::Table)
                        .if_not_exists()
                        .col(&mut id(LeadSources::Id))
                        .col(ColumnDef::new(LeadSources::BranchId).uuid().not_null())
                        .col(ColumnDef::new(LeadSources::Name).string().not_null())
                        .col(ColumnDef::new(LeadSources::Kind).string_len(20).not_null())
                        .col(
                            ColumnDef::new(LeadSources::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(&mut created_at(LeadSources::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Leads::Table)
                        .if_not_exists()
                        .col(&mut id(Leads::Id))
                        .col(ColumnDef::new(Leads::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Leads::SourceKind).string_len(20).not_null())
                        .col(ColumnDef::new(Leads::SourceId).uuid().null())
                        .col(ColumnDef::new(Leads::ExternalId).string().null())
                        .col(ColumnDef::new(Leads::Name).string().not_null())
                        .col(ColumnDef::new(Leads::Company).string().null())
                        .col(ColumnDef::new(Leads::Email).string().null())
                        .col(ColumnDef::new(Leads::Phone).string().null())
                        .col(ColumnDef::new(Leads::Requirement).text().null())
                        .col(ColumnDef::new(Leads::City).string().null())
                        .col(ColumnDef::new(Leads::State).string().null())
                        .col(ColumnDef::new(Leads::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Leads::Priority).string_len(20).not_null())
                        .col(ColumnDef::new(Leads::AssignedTo).uuid().null())
                        .col(ColumnDef::new(Leads::CustomerId).uuid().null())
                        .col(&mut money_null(Leads::EstimatedValue, backend))
                        .col(ColumnDef::new(Leads::FollowUpDate).date().null())
                        .col(ColumnDef::new(Leads::Notes).text().null())
                        .col(&mut created_at(Leads::ReceivedAt))
                        .col(&mut created_at(Leads::CreatedAt))
                        .col(&mut created_at(Leads::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_leads_customer_id")
                                .from(Leads::Table, Leads::CustomerId)
                                .to(Customers::Table, Customers::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_leads_branch_source_external")
                        .table(Leads::Table)
                        .col(Leads::BranchId)
                        .col(Leads::SourceKind)
                        .col(Leads::ExternalId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_leads_branch_status")
                        .table(Leads::Table)
                        .col(Leads::BranchId)
                        .col(Leads::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LeadAssignmentRules::Table)
                        .if_not_exists()
                        .col(&mut id(LeadAssignmentRules::Id))
                        .col(
                            ColumnDef::new(LeadAssignmentRules::BranchId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LeadAssignmentRules::Name).string().not_null())
                        .col(
                            ColumnDef::new(LeadAssignmentRules::SourceKind)
                                .string_len(20)
                                .null(),
                        )
                        .col(ColumnDef::new(LeadAssignmentRules::Keyword).string().null())
                        .col(
                            ColumnDef::new(LeadAssignmentRules::AssigneeIds)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LeadAssignmentRules::NextIndex)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(LeadAssignmentRules::Priority)
                                .integer()
                                .not_null()
                                .default(100),
                        )
                        .col(
                            ColumnDef::new(LeadAssignmentRules::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(&mut created_at(LeadAssignmentRules::CreatedAt))
                        .col(&mut created_at(LeadAssignmentRules::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SyncSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SyncSettings::BranchId)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(SyncSettings::AutoSyncEnabled)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(SyncSettings::IntervalMinutes)
                                .integer()
                                .not_null()
                                .default(5),
                        )
                        .col(&mut created_at(SyncSettings::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SyncStatus::Table)
                        .if_not_exists()
                        .col(&mut id(SyncStatus::Id))
                        .col(ColumnDef::new(SyncStatus::BranchId).uuid().not_null())
                        .col(
                            ColumnDef::new(SyncStatus::SourceKind)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SyncStatus::LastRunAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SyncStatus::LastSuccessAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(SyncStatus::LastError).text().null())
                        .col(
                            ColumnDef::new(SyncStatus::ConsecutiveFailures)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SyncStatus::NextRunAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SyncStatus::LastNewCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SyncStatus::TotalImported)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SyncStatus::RunningSince)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(&mut created_at(SyncStatus::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_sync_status_branch_source")
                        .table(SyncStatus::Table)
                        .col(SyncStatus::BranchId)
                        .col(SyncStatus::SourceKind)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                SyncStatus::Table.into_iden(),
                SyncSettings::Table.into_iden(),
                LeadAssignmentRules::Table.into_iden(),
                Leads::Table.into_iden(),
                LeadSources::Table.into_iden(),
                Customers::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).to_owned())
                    .await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Customers {
        Table,
        Id,
        BranchId,
        Name,
        Company,
        Email,
        Phone,
        Gstin,
        StateCode,
        BillingAddress,
        ShippingAddress,
        OpeningBalance,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum LeadSources {
        Table,
        Id,
        BranchId,
        Name,
        Kind,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Leads {
        Table,
        Id,
        BranchId,
        SourceKind,
        SourceId,
        ExternalId,
        Name,
        Company,
        Email,
        Phone,
        Requirement,
        City,
        State,
        Status,
        Priority,
        AssignedTo,
        CustomerId,
        EstimatedValue,
        FollowUpDate,
        Notes,
        ReceivedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum LeadAssignmentRules {
        Table,
        Id,
        BranchId,
        Name,
        SourceKind,
        Keyword,
        AssigneeIds,
        NextIndex,
        Priority,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SyncSettings {
        Table,
        BranchId,
        AutoSyncEnabled,
        IntervalMinutes,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SyncStatus {
        Table,
        Id,
        BranchId,
        SourceKind,
        LastRunAt,
        LastSuccessAt,
        LastError,
        ConsecutiveFailures,
        NextRunAt,
        LastNewCount,
        TotalImported,
        RunningSince,
        UpdatedAt,
    }
}

mod m20250101_000003_create_document_tables {
    use super::columns::{add_line_item, add_totals, created_at, id, money};
    use super::m20250101_000002_create_sales_tables::Customers;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000003_create_document_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();

            manager
                .create_table(
                    Table::create()
                        .table(DocumentSequences::Table)
                        .if_not_exists()
                        .col(&mut id(DocumentSequences::Id))
                        .col(ColumnDef::new(DocumentSequences::BranchId).uuid().not_null())
                        .col(
                            ColumnDef::new(DocumentSequences::Kind)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DocumentSequences::NextValue)
                                .big_integer()
                                .not_null(),
                        )
                        .col(&mut created_at(DocumentSequences::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_document_sequences_branch_kind")
                        .table(DocumentSequences::Table)
                        .col(DocumentSequences::BranchId)
                        .col(DocumentSequences::Kind)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // quotations
            let mut quotations = Table::create();
            quotations
                .table(Quotations::Table)
                .if_not_exists()
                .col(&mut id(Quotations::Id))
                .col(ColumnDef::new(Quotations::BranchId).uuid().not_null())
                .col(ColumnDef::new(Quotations::QuotationNumber).string_len(32).not_null())
                .col(ColumnDef::new(Quotations::CustomerId).uuid().not_null())
                .col(ColumnDef::new(Quotations::LeadId).uuid().null())
                .col(ColumnDef::new(Quotations::Status).string_len(20).not_null())
                .col(ColumnDef::new(Quotations::QuotationDate).date().not_null())
                .col(ColumnDef::new(Quotations::ValidUntil).date().null())
                .col(ColumnDef::new(Quotations::PlaceOfSupply).string_len(2).not_null());
            add_totals(&mut quotations, backend);
            quotations
                .col(ColumnDef::new(Quotations::Terms).text().null())
                .col(ColumnDef::new(Quotations::Notes).text().null())
                .col(
                    ColumnDef::new(Quotations::Revision)
                        .integer()
                        .not_null()
                        .default(1),
                )
                .col(ColumnDef::new(Quotations::CreatedBy).uuid().not_null())
                .col(&mut created_at(Quotations::CreatedAt))
                .col(&mut created_at(Quotations::UpdatedAt))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_quotations_customer_id")
                        .from(Quotations::Table, Quotations::CustomerId)
                        .to(Customers::Table, Customers::Id),
                );
            manager.create_table(quotations).await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_quotations_branch_number")
                        .table(Quotations::Table)
                        .col(Quotations::BranchId)
                        .col(Quotations::QuotationNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            let mut quotation_items = Table::create();
            quotation_items
                .table(QuotationItems::Table)
                .if_not_exists()
                .col(&mut id(QuotationItems::Id))
                .col(ColumnDef::new(QuotationItems::QuotationId).uuid().not_null());
            add_line_item(&mut quotation_items, backend);
            quotation_items.foreign_key(
                ForeignKey::create()
                    .name("fk_quotation_items_quotation_id")
                    .from(QuotationItems::Table, QuotationItems::QuotationId)
                    .to(Quotations::Table, Quotations::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            );
            manager.create_table(quotation_items).await?;

            manager
                .create_table(
                    Table::create()
                        .table(QuotationRevisions::Table)
                        .if_not_exists()
                        .col(&mut id(QuotationRevisions::Id))
                        .col(
                            ColumnDef::new(QuotationRevisions::QuotationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(QuotationRevisions::Revision)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(QuotationRevisions::Snapshot).json().not_null())
                        .col(ColumnDef::new(QuotationRevisions::Reason).text().null())
                        .col(ColumnDef::new(QuotationRevisions::CreatedBy).uuid().not_null())
                        .col(&mut created_at(QuotationRevisions::CreatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_quotation_revisions_quotation_id")
                                .from(QuotationRevisions::Table, QuotationRevisions::QuotationId)
                                .to(Quotations::Table, Quotations::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // orders
            let mut orders = Table::create();
            orders
                .table(Orders::Table)
                .if_not_exists()
                .col(&mut id(Orders::Id))
                .col(ColumnDef::new(Orders::BranchId).uuid().not_null())
                .col(ColumnDef::new(Orders::OrderNumber).string_len(32).not_null())
                .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                .col(ColumnDef::new(Orders::QuotationId).uuid().null())
                .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                .col(ColumnDef::new(Orders::OrderDate).date().not_null())
                .col(ColumnDef::new(Orders::ExpectedDelivery).date().null())
                .col(ColumnDef::new(Orders::PlaceOfSupply).string_len(2).not_null());
            add_totals(&mut orders, backend);
            orders
                .col(ColumnDef::new(Orders::Notes).text().null())
                .col(ColumnDef::new(Orders::CreatedBy).uuid().not_null())
                .col(&mut created_at(Orders::CreatedAt))
                .col(&mut created_at(Orders::UpdatedAt))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_orders_customer_id")
                        .from(Orders::Table, Orders::CustomerId)
                        .to(Customers::Table, Customers::Id),
                );
            manager.create_table(orders).await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_orders_branch_number")
                        .table(Orders::Table)
                        .col(Orders::BranchId)
                        .col(Orders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            let mut order_items = Table::create();
            order_items
                .table(OrderItems::Table)
                .if_not_exists()
                .col(&mut id(OrderItems::Id))
                .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null());
            add_line_item(&mut order_items, backend);
            order_items.foreign_key(
                ForeignKey::create()
                    .name("fk_order_items_order_id")
                    .from(OrderItems::Table, OrderItems::OrderId)
                    .to(Orders::Table, Orders::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            );
            manager.create_table(order_items).await?;

            // invoices
            let mut invoices = Table::create();
            invoices
                .table(Invoices::Table)
                .if_not_exists()
                .col(&mut id(Invoices::Id))
                .col(ColumnDef::new(Invoices::BranchId).uuid().not_null())
                .col(ColumnDef::new(Invoices::InvoiceNumber).string_len(32).not_null())
                .col(ColumnDef::new(Invoices::CustomerId).uuid().not_null())
                .col(ColumnDef::new(Invoices::OrderId).uuid().null())
                .col(ColumnDef::new(Invoices::Status).string_len(20).not_null())
                .col(ColumnDef::new(Invoices::InvoiceDate).date().not_null())
                .col(ColumnDef::new(Invoices::DueDate).date().null())
                .col(ColumnDef::new(Invoices::PlaceOfSupply).string_len(2).not_null());
            add_totals(&mut invoices, backend);
            invoices
                .col(&mut money(Invoices::AmountPaid, backend))
                .col(&mut money(Invoices::BalanceDue, backend))
                .col(ColumnDef::new(Invoices::Notes).text().null())
                .col(ColumnDef::new(Invoices::CreatedBy).uuid().not_null())
                .col(&mut created_at(Invoices::CreatedAt))
                .col(&mut created_at(Invoices::UpdatedAt))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_invoices_customer_id")
                        .from(Invoices::Table, Invoices::CustomerId)
                        .to(Customers::Table, Customers::Id),
                );
            manager.create_table(invoices).await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_invoices_branch_number")
                        .table(Invoices::Table)
                        .col(Invoices::BranchId)
                        .col(Invoices::InvoiceNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            let mut invoice_items = Table::create();
            invoice_items
                .table(InvoiceItems::Table)
                .if_not_exists()
                .col(&mut id(InvoiceItems::Id))
                .col(ColumnDef::new(InvoiceItems::InvoiceId).uuid().not_null());
            add_line_item(&mut invoice_items, backend);
            invoice_items.foreign_key(
                ForeignKey::create()
                    .name("fk_invoice_items_invoice_id")
                    .from(InvoiceItems::Table, InvoiceItems::InvoiceId)
                    .to(Invoices::Table, Invoices::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            );
            manager.create_table(invoice_items).await?;

            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(&mut id(Payments::Id))
                        .col(ColumnDef::new(Payments::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Payments::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Payments::InvoiceId).uuid().null())
                        .col(&mut money(Payments::Amount, backend))
                        .col(ColumnDef::new(Payments::Method).string_len(20).not_null())
                        .col(ColumnDef::new(Payments::Reference).string().null())
                        .col(ColumnDef::new(Payments::PaymentDate).date().not_null())
                        .col(ColumnDef::new(Payments::ReceiptPath).string().null())
                        .col(ColumnDef::new(Payments::Notes).text().null())
                        .col(ColumnDef::new(Payments::CreatedBy).uuid().not_null())
                        .col(&mut created_at(Payments::CreatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payments_customer_id")
                                .from(Payments::Table, Payments::CustomerId)
                                .to(Customers::Table, Customers::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_invoice_id")
                        .table(Payments::Table)
                        .col(Payments::InvoiceId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LedgerEntries::Table)
                        .if_not_exists()
                        .col(&mut id(LedgerEntries::Id))
                        .col(ColumnDef::new(LedgerEntries::BranchId).uuid().not_null())
                        .col(ColumnDef::new(LedgerEntries::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(LedgerEntries::EntryDate).date().not_null())
                        .col(ColumnDef::new(LedgerEntries::Description).string().not_null())
                        .col(&mut money(LedgerEntries::Debit, backend))
                        .col(&mut money(LedgerEntries::Credit, backend))
                        .col(&mut money(LedgerEntries::Balance, backend))
                        .col(
                            ColumnDef::new(LedgerEntries::SourceType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerEntries::SourceId).uuid().null())
                        .col(ColumnDef::new(LedgerEntries::CreatedBy).uuid().not_null())
                        .col(&mut created_at(LedgerEntries::CreatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_ledger_entries_customer_id")
                                .from(LedgerEntries::Table, LedgerEntries::CustomerId)
                                .to(Customers::Table, Customers::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_entries_customer_date")
                        .table(LedgerEntries::Table)
                        .col(LedgerEntries::CustomerId)
                        .col(LedgerEntries::EntryDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                LedgerEntries::Table.into_iden(),
                Payments::Table.into_iden(),
                InvoiceItems::Table.into_iden(),
                Invoices::Table.into_iden(),
                OrderItems::Table.into_iden(),
                Orders::Table.into_iden(),
                QuotationRevisions::Table.into_iden(),
                QuotationItems::Table.into_iden(),
                Quotations::Table.into_iden(),
                DocumentSequences::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).to_owned())
                    .await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum DocumentSequences {
        Table,
        Id,
        BranchId,
        Kind,
        NextValue,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Quotations {
        Table,
        Id,
        BranchId,
        QuotationNumber,
        CustomerId,
        LeadId,
        Status,
        QuotationDate,
        ValidUntil,
        PlaceOfSupply,
        Terms,
        Notes,
        Revision,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum QuotationItems {
        Table,
        Id,
        QuotationId,
    }

    #[derive(DeriveIden)]
    enum QuotationRevisions {
        Table,
        Id,
        QuotationId,
        Revision,
        Snapshot,
        Reason,
        CreatedBy,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        BranchId,
        OrderNumber,
        CustomerId,
        QuotationId,
        Status,
        OrderDate,
        ExpectedDelivery,
        PlaceOfSupply,
        Notes,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
    }

    #[derive(DeriveIden)]
    enum Invoices {
        Table,
        Id,
        BranchId,
        InvoiceNumber,
        CustomerId,
        OrderId,
        Status,
        InvoiceDate,
        DueDate,
        PlaceOfSupply,
        AmountPaid,
        BalanceDue,
        Notes,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InvoiceItems {
        Table,
        Id,
        InvoiceId,
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        BranchId,
        CustomerId,
        InvoiceId,
        Amount,
        Method,
        Reference,
        PaymentDate,
        ReceiptPath,
        Notes,
        CreatedBy,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum LedgerEntries {
        Table,
        Id,
        BranchId,
        CustomerId,
        EntryDate,
        Description,
        Debit,
        Credit,
        Balance,
        SourceType,
        SourceId,
        CreatedBy,
        CreatedAt,
    }
}

mod m20250101_000004_create_hr_tables {
    use super::columns::{created_at, id, money};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000004_create_hr_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();

            manager
                .create_table(
                    Table::create()
                        .table(Employees::Table)
                        .if_not_exists()
                        .col(&mut id(Employees::Id))
                        .col(ColumnDef::new(Employees::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Employees::ProfileId).uuid().null())
                        .col(ColumnDef::new(Employees::EmployeeCode).string_len(32).not_null())
                        .col(ColumnDef::new(Employees::FullName).string().not_null())
                        .col(ColumnDef::new(Employees::Email).string().not_null())
                        .col(ColumnDef::new(Employees::Phone).string().null())
                        .col(ColumnDef::new(Employees::Designation).string().null())
                        .col(ColumnDef::new(Employees::Department).string().null())
                        .col(ColumnDef::new(Employees::DateOfJoining).date().not_null())
                        .col(ColumnDef::new(Employees::Status).string_len(20).not_null())
                        .col(&mut money(Employees::BasicSalary, backend))
                        .col(&mut money(Employees::Hra, backend))
                        .col(&mut money(Employees::Allowances, backend))
                        .col(
                            ColumnDef::new(Employees::PfApplicable)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(&mut created_at(Employees::CreatedAt))
                        .col(&mut created_at(Employees::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_employees_branch_code")
                        .table(Employees::Table)
                        .col(Employees::BranchId)
                        .col(Employees::EmployeeCode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LeaveRequests::Table)
                        .if_not_exists()
                        .col(&mut id(LeaveRequests::Id))
                        .col(ColumnDef::new(LeaveRequests::BranchId).uuid().not_null())
                        .col(ColumnDef::new(LeaveRequests::EmployeeId).uuid().not_null())
                        .col(
                            ColumnDef::new(LeaveRequests::LeaveType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(LeaveRequests::StartDate).date().not_null())
                        .col(ColumnDef::new(LeaveRequests::EndDate).date().not_null())
                        .col(
                            ColumnDef::new(LeaveRequests::HalfDay)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(&mut money(LeaveRequests::Days, backend))
                        .col(ColumnDef::new(LeaveRequests::Reason).text().null())
                        .col(ColumnDef::new(LeaveRequests::Status).string_len(20).not_null())
                        .col(ColumnDef::new(LeaveRequests::ReviewedBy).uuid().null())
                        .col(
                            ColumnDef::new(LeaveRequests::ReviewedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(LeaveRequests::ReviewNote).text().null())
                        .col(&mut created_at(LeaveRequests::CreatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_leave_requests_employee_id")
                                .from(LeaveRequests::Table, LeaveRequests::EmployeeId)
                                .to(Employees::Table, Employees::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PaySlips::Table)
                        .if_not_exists()
                        .col(&mut id(PaySlips::Id))
                        .col(ColumnDef::new(PaySlips::BranchId).uuid().not_null())
                        .col(ColumnDef::new(PaySlips::EmployeeId).uuid().not_null())
                        .col(ColumnDef::new(PaySlips::PeriodYear).integer().not_null())
                        .col(ColumnDef::new(PaySlips::PeriodMonth).integer().not_null())
                        .col(ColumnDef::new(PaySlips::WorkingDays).integer().not_null())
                        .col(&mut money(PaySlips::LopDays, backend))
                        .col(&mut money(PaySlips::PaidDays, backend))
                        .col(&mut money(PaySlips::EarnedBasic, backend))
                        .col(&mut money(PaySlips::EarnedHra, backend))
                        .col(&mut money(PaySlips::EarnedAllowances, backend))
                        .col(&mut money(PaySlips::Gross, backend))
                        .col(&mut money(PaySlips::PfDeduction, backend))
                        .col(&mut money(PaySlips::ProfessionalTax, backend))
                        .col(&mut money(PaySlips::Tds, backend))
                        .col(&mut money(PaySlips::OtherDeductions, backend))
                        .col(&mut money(PaySlips::LopDeduction, backend))
                        .col(&mut money(PaySlips::TotalDeductions, backend))
                        .col(&mut money(PaySlips::NetPay, backend))
                        .col(ColumnDef::new(PaySlips::Status).string_len(20).not_null())
                        .col(ColumnDef::new(PaySlips::GeneratedBy).uuid().not_null())
                        .col(&mut created_at(PaySlips::CreatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_pay_slips_employee_id")
                                .from(PaySlips::Table, PaySlips::EmployeeId)
                                .to(Employees::Table, Employees::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_pay_slips_employee_period")
                        .table(PaySlips::Table)
                        .col(PaySlips::EmployeeId)
                        .col(PaySlips::PeriodYear)
                        .col(PaySlips::PeriodMonth)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                PaySlips::Table.into_iden(),
                LeaveRequests::Table.into_iden(),
                Employees::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).to_owned())
                    .await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Employees {
        Table,
        Id,
        BranchId,
        ProfileId,
        EmployeeCode,
        FullName,
        Email,
        Phone,
        Designation,
        Department,
        DateOfJoining,
        Status,
        BasicSalary,
        Hra,
        Allowances,
        PfApplicable,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum LeaveRequests {
        Table,
        Id,
        BranchId,
        EmployeeId,
        LeaveType,
        StartDate,
        EndDate,
        HalfDay,
        Days,
        Reason,
        Status,
        ReviewedBy,
        ReviewedAt,
        ReviewNote,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum PaySlips {
        Table,
        Id,
        BranchId,
        EmployeeId,
        PeriodYear,
        PeriodMonth,
        WorkingDays,
        LopDays,
        PaidDays,
        EarnedBasic,
        EarnedHra,
        EarnedAllowances,
        Gross,
        PfDeduction,
        ProfessionalTax,
        Tds,
        OtherDeductions,
        LopDeduction,
        TotalDeductions,
        NetPay,
        Status,
        GeneratedBy,
        CreatedAt,
    }
}

mod m20250101_000005_create_procurement_and_dispatch_tables {
    use super::columns::{add_line_item, add_totals, created_at, id, quantity};
    use super::m20250101_000003_create_document_tables::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000005_create_procurement_and_dispatch_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();

            manager
                .create_table(
                    Table::create()
                        .table(Vendors::Table)
                        .if_not_exists()
                        .col(&mut id(Vendors::Id))
                        .col(ColumnDef::new(Vendors::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Vendors::Name).string().not_null())
                        .col(ColumnDef::new(Vendors::ContactPerson).string().null())
                        .col(ColumnDef::new(Vendors::Email).string().null())
                        .col(ColumnDef::new(Vendors::Phone).string().null())
                        .col(ColumnDef::new(Vendors::Gstin).string_len(15).null())
                        .col(ColumnDef::new(Vendors::StateCode).string_len(2).null())
                        .col(ColumnDef::new(Vendors::Address).text().null())
                        .col(ColumnDef::new(Vendors::PaymentTerms).string().null())
                        .col(
                            ColumnDef::new(Vendors::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(&mut created_at(Vendors::CreatedAt))
                        .col(&mut created_at(Vendors::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            let mut purchase_orders = Table::create();
            purchase_orders
                .table(PurchaseOrders::Table)
                .if_not_exists()
                .col(&mut id(PurchaseOrders::Id))
                .col(ColumnDef::new(PurchaseOrders::BranchId).uuid().not_null())
                .col(ColumnDef::new(PurchaseOrders::PoNumber).string_len(32).not_null())
                .col(ColumnDef::new(PurchaseOrders::VendorId).uuid().not_null())
                .col(ColumnDef::new(PurchaseOrders::Status).string_len(20).not_null())
                .col(ColumnDef::new(PurchaseOrders::OrderDate).date().not_null())
                .col(ColumnDef::new(PurchaseOrders::ExpectedDate).date().null())
                .col(
                    ColumnDef::new(PurchaseOrders::PlaceOfSupply)
                        .string_len(2)
                        .not_null(),
                );
            add_totals(&mut purchase_orders, backend);
            purchase_orders
                .col(ColumnDef::new(PurchaseOrders::DocumentPath).string().null())
                .col(ColumnDef::new(PurchaseOrders::Notes).text().null())
                .col(ColumnDef::new(PurchaseOrders::CreatedBy).uuid().not_null())
                .col(&mut created_at(PurchaseOrders::CreatedAt))
                .col(&mut created_at(PurchaseOrders::UpdatedAt))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_purchase_orders_vendor_id")
                        .from(PurchaseOrders::Table, PurchaseOrders::VendorId)
                        .to(Vendors::Table, Vendors::Id),
                );
            manager.create_table(purchase_orders).await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_purchase_orders_branch_number")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::BranchId)
                        .col(PurchaseOrders::PoNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            let mut po_items = Table::create();
            po_items
                .table(PurchaseOrderItems::Table)
                .if_not_exists()
                .col(&mut id(PurchaseOrderItems::Id))
                .col(
                    ColumnDef::new(PurchaseOrderItems::PurchaseOrderId)
                        .uuid()
                        .not_null(),
                );
            add_line_item(&mut po_items, backend);
            po_items
                .col(&mut quantity(PurchaseOrderItems::ReceivedQuantity, backend))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_purchase_order_items_po_id")
                        .from(PurchaseOrderItems::Table, PurchaseOrderItems::PurchaseOrderId)
                        .to(PurchaseOrders::Table, PurchaseOrders::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                );
            manager.create_table(po_items).await?;

            manager
                .create_table(
                    Table::create()
                        .table(Shipments::Table)
                        .if_not_exists()
                        .col(&mut id(Shipments::Id))
                        .col(ColumnDef::new(Shipments::BranchId).uuid().not_null())
                        .col(
                            ColumnDef::new(Shipments::ShipmentNumber)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Shipments::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Shipments::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Shipments::Carrier).string().null())
                        .col(ColumnDef::new(Shipments::TrackingNumber).string().null())
                        .col(ColumnDef::new(Shipments::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Shipments::DispatchDate).date().null())
                        .col(ColumnDef::new(Shipments::ExpectedDelivery).date().null())
                        .col(
                            ColumnDef::new(Shipments::DeliveredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Shipments::ShippingAddress).text().null())
                        .col(ColumnDef::new(Shipments::Notes).text().null())
                        .col(ColumnDef::new(Shipments::CreatedBy).uuid().not_null())
                        .col(&mut created_at(Shipments::CreatedAt))
                        .col(&mut created_at(Shipments::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_shipments_order_id")
                                .from(Shipments::Table, Shipments::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_shipments_branch_number")
                        .table(Shipments::Table)
                        .col(Shipments::BranchId)
                        .col(Shipments::ShipmentNumber)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                Shipments::Table.into_iden(),
                PurchaseOrderItems::Table.into_iden(),
                PurchaseOrders::Table.into_iden(),
                Vendors::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).to_owned())
                    .await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Vendors {
        Table,
        Id,
        BranchId,
        Name,
        ContactPerson,
        Email,
        Phone,
        Gstin,
        StateCode,
        Address,
        PaymentTerms,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrders {
        Table,
        Id,
        BranchId,
        PoNumber,
        VendorId,
        Status,
        OrderDate,
        ExpectedDate,
        PlaceOfSupply,
        DocumentPath,
        Notes,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrderItems {
        Table,
        Id,
        PurchaseOrderId,
        ReceivedQuantity,
    }

    #[derive(DeriveIden)]
    enum Shipments {
        Table,
        Id,
        BranchId,
        ShipmentNumber,
        OrderId,
        CustomerId,
        Carrier,
        TrackingNumber,
        Status,
        DispatchDate,
        ExpectedDelivery,
        DeliveredAt,
        ShippingAddress,
        Notes,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }
}
