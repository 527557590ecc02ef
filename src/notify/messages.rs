use serde::{Deserialize, Serialize};

pub const LIVE_TITLE: &str = "📢 Live Azaan";
pub const LIVE_BODY: &str = "The azaan is starting now";
/// App screen the client opens when the notification is tapped
pub const LIVE_SCREEN: &str = "Timing";
pub const ANDROID_CHANNEL: &str = "AzaanChannel";

/// Broadcast status carried in the data payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastStatus {
    Broadcasting,
}

impl BroadcastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastStatus::Broadcasting => "broadcasting",
        }
    }
}

/// One push notification for one listener device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub token: String,
    pub venue_id: String,
    pub playback_url: String,
    pub status: BroadcastStatus,
}

impl NotificationMessage {
    /// Build the FCM HTTP v1 request body
    pub fn to_fcm(&self) -> FcmMessage {
        FcmMessage {
            message: FcmMessageContent {
                token: self.token.clone(),
                notification: FcmNotification {
                    title: LIVE_TITLE.to_string(),
                    body: LIVE_BODY.to_string(),
                },
                // FCM data values must all be strings
                data: LiveData {
                    masjid_id: self.venue_id.clone(),
                    stream_url: self.playback_url.clone(),
                    screen: LIVE_SCREEN.to_string(),
                    status: self.status.as_str().to_string(),
                },
                android: AndroidConfig {
                    priority: "high".to_string(),
                    notification: AndroidNotification {
                        channel_id: ANDROID_CHANNEL.to_string(),
                        sound: "default".to_string(),
                    },
                },
            },
        }
    }
}

/// FCM message request
#[derive(Debug, Serialize)]
pub struct FcmMessage {
    pub message: FcmMessageContent,
}

#[derive(Debug, Serialize)]
pub struct FcmMessageContent {
    pub token: String,
    pub notification: FcmNotification,
    pub data: LiveData,
    pub android: AndroidConfig,
}

#[derive(Debug, Serialize)]
pub struct FcmNotification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveData {
    pub masjid_id: String,
    pub stream_url: String,
    pub screen: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct AndroidConfig {
    pub priority: String,
    pub notification: AndroidNotification,
}

#[derive(Debug, Serialize)]
pub struct AndroidNotification {
    pub channel_id: String,
    pub sound: String,
}

/// FCM API response
#[derive(Debug, Deserialize)]
pub struct FcmApiResponse {
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fcm_payload_carries_playback_details() {
        let msg = NotificationMessage {
            token: "device-token-1".to_string(),
            venue_id: "42".to_string(),
            playback_url: "https://api.example.org/hls/42/stream.m3u8".to_string(),
            status: BroadcastStatus::Broadcasting,
        };

        let json = serde_json::to_value(msg.to_fcm()).unwrap();
        let message = &json["message"];

        assert_eq!(message["token"], "device-token-1");
        assert_eq!(message["notification"]["title"], LIVE_TITLE);
        assert_eq!(message["notification"]["body"], LIVE_BODY);
        assert_eq!(message["data"]["masjidId"], "42");
        assert_eq!(
            message["data"]["streamUrl"],
            "https://api.example.org/hls/42/stream.m3u8"
        );
        assert_eq!(message["data"]["screen"], "Timing");
        assert_eq!(message["data"]["status"], "broadcasting");
        assert_eq!(message["android"]["priority"], "high");
        assert_eq!(message["android"]["notification"]["channel_id"], "AzaanChannel");
    }
}
