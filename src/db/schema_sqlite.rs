// Same tables as schema.rs with SQLite storage types.

diesel::table! {
    automations (id) {
        id -> Integer,
        guild_id -> Text,
        name -> Text,
        description -> Nullable<Text>,
        enabled -> Bool,
        trigger_event -> Nullable<Text>,
        trigger_events -> Text,
        trigger_filters -> Text,
        action_type -> Nullable<Text>,
        action_config -> Text,
        created_by -> Nullable<Text>,
        trigger_count -> BigInt,
        last_triggered_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    automation_logs (id) {
        id -> Integer,
        automation_id -> Integer,
        guild_id -> Text,
        trigger_event -> Text,
        trigger_data -> Text,
        action_result -> Text,
        success -> Bool,
        error_message -> Nullable<Text>,
        execution_time_ms -> BigInt,
        created_at -> Text,
    }
}

diesel::table! {
    event_logs (id) {
        id -> Integer,
        guild_id -> Text,
        event_type -> Text,
        event_category -> Text,
        actor_id -> Nullable<Text>,
        actor_name -> Nullable<Text>,
        target_id -> Nullable<Text>,
        target_name -> Nullable<Text>,
        channel_id -> Nullable<Text>,
        channel_name -> Nullable<Text>,
        details -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    guild_settings (guild_id) {
        guild_id -> Text,
        logging_enabled -> Bool,
        log_channel_id -> Nullable<Text>,
        excluded_channels -> Text,
        excluded_categories -> Text,
        updated_at -> Text,
    }
}

diesel::joinable!(automation_logs -> automations (automation_id));
diesel::allow_tables_to_appear_in_same_query!(automations, automation_logs);
