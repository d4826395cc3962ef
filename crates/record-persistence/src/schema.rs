// Esquema Diesel del store local (SQLite).
// Tablas: entities, pending_operations, processing_jobs, detail_rows
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    entities (table_name, id) {
        table_name -> Text,
        id -> Text,
        data -> Text,
        updated_at -> Text,
    }
}
diesel::table! {
    pending_operations (id) {
        id -> Text,
        kind -> Text,
        entity_table -> Text,
        target_id -> Text,
        payload -> Text,
        enqueued_at_ts -> BigInt,
    }
}
diesel::table! {
    processing_jobs (id) {
        id -> Text,
        data_type -> Text,
        user_id -> Text,
        org_id -> Text,
        sample_id -> Text,
        config_id -> Text,
        created_at_ts -> BigInt,
        updated_at_ts -> BigInt,
        state -> Text,
        status_message -> Text,
        progress_percentage -> Integer,
        raw_data_id -> Text,
        processed_data_id -> Text,
    }
}
diesel::table! {
    detail_rows (id) {
        id -> Text,
        job_id -> Text,
        detail_table -> Text,
        data_id -> Text,
        ordinal -> BigInt,
        data -> Text,
    }
}
diesel::joinable!(detail_rows -> processing_jobs (job_id));
allow_tables_to_appear_in_same_query!(entities, pending_operations, processing_jobs, detail_rows);
