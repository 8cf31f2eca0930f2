use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_grn_batches_table::Migration),
            Box::new(m20240601_000002_create_grn_po_links_table::Migration),
            Box::new(m20240601_000003_create_grn_line_selections_table::Migration),
            Box::new(m20240601_000004_create_grn_detail_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240601_000001_create_grn_batches_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_grn_batches_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(GrnBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GrnBatches::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(GrnBatches::BatchNumber)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(GrnBatches::UserId).string().not_null())
                        .col(
                            ColumnDef::new(GrnBatches::CustomerCode)
                                .string_len(50)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnBatches::CustomerName)
                                .string_len(200)
                                .not_null(),
                        )
                        .col(ColumnDef::new(GrnBatches::DocSeriesId).string_len(50).null())
                        .col(
                            ColumnDef::new(GrnBatches::DocSeriesName)
                                .string_len(200)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnBatches::Status)
                                .string_len(20)
                                .not_null()
                                .default("draft"),
                        )
                        .col(
                            ColumnDef::new(GrnBatches::QcStatus)
                                .string_len(20)
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(GrnBatches::QcApproverId).string().null())
                        .col(
                            ColumnDef::new(GrnBatches::QcReviewedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(GrnBatches::QcNotes).text().null())
                        .col(
                            ColumnDef::new(GrnBatches::SubmittedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnBatches::TotalPos)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(GrnBatches::TotalGrnsCreated)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(GrnBatches::ErrorLog).text().null())
                        .col(
                            ColumnDef::new(GrnBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnBatches::PostedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnBatches::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(GrnBatches::PostedById).string().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_grn_batches_user_created")
                        .table(GrnBatches::Table)
                        .col(GrnBatches::UserId)
                        .col(GrnBatches::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_grn_batches_status")
                        .table(GrnBatches::Table)
                        .col(GrnBatches::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(GrnBatches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum GrnBatches {
        Table,
        Id,
        BatchNumber,
        UserId,
        CustomerCode,
        CustomerName,
        DocSeriesId,
        DocSeriesName,
        Status,
        QcStatus,
        QcApproverId,
        QcReviewedAt,
        QcNotes,
        SubmittedAt,
        TotalPos,
        TotalGrnsCreated,
        ErrorLog,
        CreatedAt,
        PostedAt,
        CompletedAt,
        PostedById,
    }
}

mod m20240601_000002_create_grn_po_links_table {

    use super::m20240601_000001_create_grn_batches_table::GrnBatches;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_grn_po_links_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(GrnPoLinks::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GrnPoLinks::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(GrnPoLinks::BatchId).integer().not_null())
                        .col(ColumnDef::new(GrnPoLinks::PoDocEntry).integer().not_null())
                        .col(
                            ColumnDef::new(GrnPoLinks::PoDocNum)
                                .string_len(50)
                                .not_null(),
                        )
                        .col(ColumnDef::new(GrnPoLinks::PoCardCode).string_len(50).null())
                        .col(
                            ColumnDef::new(GrnPoLinks::PoCardName)
                                .string_len(200)
                                .null(),
                        )
                        .col(ColumnDef::new(GrnPoLinks::PoDocDate).date().null())
                        .col(ColumnDef::new(GrnPoLinks::PoDocTotal).decimal_len(16, 4).null())
                        .col(
                            ColumnDef::new(GrnPoLinks::Status)
                                .string_len(20)
                                .not_null()
                                .default("selected"),
                        )
                        .col(
                            ColumnDef::new(GrnPoLinks::SapGrnDocNum)
                                .string_len(50)
                                .null(),
                        )
                        .col(ColumnDef::new(GrnPoLinks::SapGrnDocEntry).integer().null())
                        .col(
                            ColumnDef::new(GrnPoLinks::PostedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(GrnPoLinks::ErrorMessage).text().null())
                        .col(
                            ColumnDef::new(GrnPoLinks::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_grn_po_links_batch")
                                .from(GrnPoLinks::Table, GrnPoLinks::BatchId)
                                .to(GrnBatches::Table, GrnBatches::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // A purchase order can be attached to a batch only once.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_batch_po")
                        .table(GrnPoLinks::Table)
                        .col(GrnPoLinks::BatchId)
                        .col(GrnPoLinks::PoDocEntry)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(GrnPoLinks::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum GrnPoLinks {
        Table,
        Id,
        BatchId,
        PoDocEntry,
        PoDocNum,
        PoCardCode,
        PoCardName,
        PoDocDate,
        PoDocTotal,
        Status,
        SapGrnDocNum,
        SapGrnDocEntry,
        PostedAt,
        ErrorMessage,
        CreatedAt,
    }
}

mod m20240601_000003_create_grn_line_selections_table {

    use super::m20240601_000002_create_grn_po_links_table::GrnPoLinks;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_grn_line_selections_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(GrnLineSelections::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GrnLineSelections::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::PoLinkId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::PoLineNum)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::ItemCode)
                                .string_len(50)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::ItemDescription)
                                .string_len(200)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::OrderedQuantity)
                                .decimal_len(15, 3)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::OpenQuantity)
                                .decimal_len(15, 3)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::SelectedQuantity)
                                .decimal_len(15, 3)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::WarehouseCode)
                                .string_len(50)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::BinLocation)
                                .string_len(200)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::UnitPrice)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::UnitOfMeasure)
                                .string_len(20)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::Origin)
                                .string_len(20)
                                .not_null()
                                .default("po_based"),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::InventoryType)
                                .string_len(20)
                                .not_null()
                                .default("standard"),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::IsComplete)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::QcStatus)
                                .string_len(20)
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(GrnLineSelections::AdminDate).date().null())
                        .col(ColumnDef::new(GrnLineSelections::ExpiryDate).date().null())
                        .col(
                            ColumnDef::new(GrnLineSelections::QtyPerPack)
                                .decimal_len(15, 3)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::NoOfPacks)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(GrnLineSelections::SerialNumbers).text().null())
                        .col(ColumnDef::new(GrnLineSelections::BatchNumbers).text().null())
                        .col(ColumnDef::new(GrnLineSelections::PostingPayload).text().null())
                        .col(
                            ColumnDef::new(GrnLineSelections::BarcodeGenerated)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(GrnLineSelections::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_grn_line_selections_po_link")
                                .from(GrnLineSelections::Table, GrnLineSelections::PoLinkId)
                                .to(GrnPoLinks::Table, GrnPoLinks::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_grn_line_selections_po_link")
                        .table(GrnLineSelections::Table)
                        .col(GrnLineSelections::PoLinkId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(GrnLineSelections::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum GrnLineSelections {
        Table,
        Id,
        PoLinkId,
        PoLineNum,
        ItemCode,
        ItemDescription,
        OrderedQuantity,
        OpenQuantity,
        SelectedQuantity,
        WarehouseCode,
        BinLocation,
        UnitPrice,
        UnitOfMeasure,
        Origin,
        InventoryType,
        IsComplete,
        QcStatus,
        AdminDate,
        ExpiryDate,
        QtyPerPack,
        NoOfPacks,
        SerialNumbers,
        BatchNumbers,
        PostingPayload,
        BarcodeGenerated,
        CreatedAt,
    }
}

mod m20240601_000004_create_grn_detail_tables {

    use super::m20240601_000003_create_grn_line_selections_table::GrnLineSelections;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_grn_detail_tables"
        }
    }

    fn line_foreign_key<T: IntoIden + Copy + 'static, C: IntoIden + Copy + 'static>(
        name: &str,
        table: T,
        column: C,
    ) -> ForeignKeyCreateStatement {
        ForeignKey::create()
            .name(name)
            .from(table, column)
            .to(GrnLineSelections::Table, GrnLineSelections::Id)
            .on_delete(ForeignKeyAction::Cascade)
            .on_update(ForeignKeyAction::Cascade)
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(GrnBatchDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GrnBatchDetails::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(GrnBatchDetails::LineSelectionId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnBatchDetails::BatchNumber)
                                .string_len(100)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnBatchDetails::Quantity)
                                .decimal_len(15, 3)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnBatchDetails::ManufacturerSerialNumber)
                                .string_len(100)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnBatchDetails::InternalSerialNumber)
                                .string_len(100)
                                .null(),
                        )
                        .col(ColumnDef::new(GrnBatchDetails::ExpiryDate).date().null())
                        .col(ColumnDef::new(GrnBatchDetails::AdminDate).date().null())
                        .col(ColumnDef::new(GrnBatchDetails::Barcode).string_len(200).null())
                        .col(
                            ColumnDef::new(GrnBatchDetails::GrnNumber)
                                .string_len(50)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnBatchDetails::QtyPerPack)
                                .decimal_len(15, 3)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnBatchDetails::NoOfPacks)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(GrnBatchDetails::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(&mut line_foreign_key(
                            "fk_grn_batch_details_line",
                            GrnBatchDetails::Table,
                            GrnBatchDetails::LineSelectionId,
                        ))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(GrnSerialDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GrnSerialDetails::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(GrnSerialDetails::LineSelectionId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnSerialDetails::SerialNumber)
                                .string_len(100)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnSerialDetails::ManufacturerSerialNumber)
                                .string_len(100)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnSerialDetails::InternalSerialNumber)
                                .string_len(100)
                                .null(),
                        )
                        .col(ColumnDef::new(GrnSerialDetails::ExpiryDate).date().null())
                        .col(ColumnDef::new(GrnSerialDetails::AdminDate).date().null())
                        .col(
                            ColumnDef::new(GrnSerialDetails::Barcode)
                                .string_len(200)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnSerialDetails::GrnNumber)
                                .string_len(50)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnSerialDetails::QtyPerPack)
                                .decimal_len(15, 3)
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(GrnSerialDetails::NoOfPacks)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(GrnSerialDetails::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(&mut line_foreign_key(
                            "fk_grn_serial_details_line",
                            GrnSerialDetails::Table,
                            GrnSerialDetails::LineSelectionId,
                        ))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(GrnNonManagedDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GrnNonManagedDetails::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(GrnNonManagedDetails::LineSelectionId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnNonManagedDetails::Quantity)
                                .decimal_len(15, 3)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GrnNonManagedDetails::ExpiryDate)
                                .string_len(50)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnNonManagedDetails::AdminDate)
                                .string_len(50)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnNonManagedDetails::GrnNumber)
                                .string_len(50)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnNonManagedDetails::QtyPerPack)
                                .decimal_len(15, 3)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GrnNonManagedDetails::NoOfPacks)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(GrnNonManagedDetails::PackNumber)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(GrnNonManagedDetails::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(&mut line_foreign_key(
                            "fk_grn_non_managed_details_line",
                            GrnNonManagedDetails::Table,
                            GrnNonManagedDetails::LineSelectionId,
                        ))
                        .to_owned(),
                )
                .await?;

            for (name, table, column) in [
                (
                    "idx_grn_batch_details_line",
                    GrnBatchDetails::Table.into_iden(),
                    GrnBatchDetails::LineSelectionId.into_iden(),
                ),
                (
                    "idx_grn_serial_details_line",
                    GrnSerialDetails::Table.into_iden(),
                    GrnSerialDetails::LineSelectionId.into_iden(),
                ),
                (
                    "idx_grn_non_managed_details_line",
                    GrnNonManagedDetails::Table.into_iden(),
                    GrnNonManagedDetails::LineSelectionId.into_iden(),
                ),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(table)
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(GrnNonManagedDetails::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(GrnSerialDetails::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(GrnBatchDetails::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum GrnBatchDetails {
        Table,
        Id,
        LineSelectionId,
        BatchNumber,
        Quantity,
        ManufacturerSerialNumber,
        InternalSerialNumber,
        ExpiryDate,
        AdminDate,
        Barcode,
        GrnNumber,
        QtyPerPack,
        NoOfPacks,
        CreatedAt,
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum GrnSerialDetails {
        Table,
        Id,
        LineSelectionId,
        SerialNumber,
        ManufacturerSerialNumber,
        InternalSerialNumber,
        ExpiryDate,
        AdminDate,
        Barcode,
        GrnNumber,
        QtyPerPack,
        NoOfPacks,
        CreatedAt,
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum GrnNonManagedDetails {
        Table,
        Id,
        LineSelectionId,
        Quantity,
        ExpiryDate,
        AdminDate,
        GrnNumber,
        QtyPerPack,
        NoOfPacks,
        PackNumber,
        CreatedAt,
    }
}
